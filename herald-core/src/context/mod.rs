mod ambient;
mod codec;
mod data;
mod trace;

pub use ambient::{AmbientContext, ContextScope};
pub use data::{ContextData, DataEntry, DataScope};
