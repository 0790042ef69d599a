use std::borrow::Cow;
use std::fmt;

/// 中间件所在的一侧
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportRole {
    /// 发起方
    Caller,
    /// 处理方
    Receiver,
}

/// 传输类型：名称 + 角色
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportType {
    name: Cow<'static, str>,
    role: TransportRole,
}

impl TransportType {
    pub const IN_PROCESS: &'static str = "in-process";

    pub fn new(name: impl Into<Cow<'static, str>>, role: TransportRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn in_process(role: TransportRole) -> Self {
        Self::new(Self::IN_PROCESS, role)
    }

    pub fn caller(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TransportRole::Caller)
    }

    pub fn receiver(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TransportRole::Receiver)
    }

    /// 同名、另一角色
    pub fn with_role(&self, role: TransportRole) -> Self {
        Self {
            name: self.name.clone(),
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> TransportRole {
        self.role
    }

    pub fn is_in_process(&self) -> bool {
        self.name == Self::IN_PROCESS
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            TransportRole::Caller => "caller",
            TransportRole::Receiver => "receiver",
        };
        write!(f, "{}/{}", self.name, role)
    }
}
