//! 消息（Message）抽象
//!
//! 三类消息共享同一个基础 trait：
//! - `Command`：表达“意图”的写操作；
//! - `Query`：只读请求；
//! - `Signal`：发布/订阅通知，可被零到多个处理器消费，没有返回值。
//!
//! `Command` 与 `Query` 同属 `Request`（一对一、有响应）。消息值不可变，中间件
//! 若要修改消息，需构造新值向下传递，因此要求 `Clone`。
//!
use std::fmt;

/// 消息种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command,
    Query,
    Signal,
}

impl MessageKind {
    /// 是否为一对一的请求/响应消息
    pub fn is_request(self) -> bool {
        !matches!(self, MessageKind::Signal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Query => "query",
            MessageKind::Signal => "signal",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 所有消息的基础接口
///
/// 关联常量：
/// - `NAME`：消息的稳定名称，用于日志、追踪与路由。避免依赖 `type_name::<T>()`。
/// - `KIND`：消息种类，决定注册表的替换/追加语义。
pub trait Message: Clone + Send + Sync + 'static {
    const NAME: &'static str;
    const KIND: MessageKind;

    /// 处理结果；信号固定为 `()`
    type Response: Send + 'static;
}

/// 一对一的请求消息（命令与查询）
pub trait Request: Message {}

/// 命令：修改状态的请求，响应通常为 `()`
pub trait Command: Request {}

/// 查询：无副作用的请求
pub trait Query: Request {}

/// 信号：广播给所有订阅处理器
pub trait Signal: Message<Response = ()> {}
