//! 进程内命令/查询/信号分发核心（herald-core）
//!
//! 提供分发所需的基础构件：
//! - 消息抽象（`message`）：`Command`/`Query`（一对一请求）与 `Signal`（广播）
//! - 环境上下文（`context`）：trace id、operation id 与上下行数据的传播与合并
//! - 中间件管道（`pipeline`）：注册、排序、按类型配置与链式执行
//! - 处理器与注册表（`handler`、`registry`）
//! - 广播策略（`broadcast`）：顺序与并发，以及失败聚合
//! - 依赖解析作用域（`scope`）与传输边界契约（`transport`）
//!
//! 分发编排（解析处理器、拼接管道、建立上下文、选择策略）在 `herald-bus` 中实现。
//!
pub mod broadcast;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod transport;

// 允许在本 crate 内部通过 ::herald_core 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::herald_core 路径。
extern crate self as herald_core;
