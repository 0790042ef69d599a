//! 中间件管道
//!
//! 生命周期以类型区分：
//! - `PipelineBuilder`：可变，追加/移除/配置中间件；
//! - `Pipeline`：构建完成，不可变，绑定构建时的作用域与传输类型；
//! - `PipelineChain`：调用方与处理方管道拼接后的执行链。
//!
mod builder;
mod chain;
mod middleware;
mod transport_type;

pub use builder::{Pipeline, PipelineBuilder, PipelineConfigurator};
pub use chain::{PipelineChain, Terminal};
pub use middleware::{
    Middleware, MiddlewareAny, MiddlewareContext, Next, upcast_self, upcast_self_mut,
};
pub use transport_type::{TransportRole, TransportType};
