//! 分发层（herald-bus）
//!
//! 在 `herald-core` 的构件之上提供：
//! - `Dispatcher`：请求/信号分发编排、接收端处理
//! - `RequestClient`/`SignalPublisher`：调用处选项（管道、作用域、上下文、取消、传输、策略）
//! - `DispatcherConfig`：默认广播策略等配置
//! - 内置中间件：日志、重试
//!
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
mod invoker;
pub mod middleware;

pub use client::{RequestClient, SignalPublisher};
pub use config::{BroadcastConfig, DispatcherConfig, StrategyKind};
pub use dispatcher::Dispatcher;
pub use error::ConfigError;
