//! 信号广播策略
//!
//! 策略决定同一信号的多个处理器如何执行（顺序/并发）以及各自结果如何合并。
//! 每个处理器以 `HandlerInvoker` 的形式交给策略，调用时传入发布方的作用域。
//!
mod parallel;
mod sequential;
mod strategy;

pub use parallel::ParallelBroadcast;
pub use sequential::{FailurePolicy, SequentialBroadcast};
pub use strategy::{BroadcastContext, BroadcastingStrategy, HandlerInvoker, InvokeHandler};

#[cfg(test)]
pub(crate) mod testing;
