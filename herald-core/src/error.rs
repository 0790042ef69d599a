//! 分发核心统一错误定义
//!
//! 分为三类：配置错误（注册/管道配置/参数校验，永不重试）、运行时错误
//! （处理器与中间件失败、传输失败）以及取消。广播场景额外使用 `Aggregate`
//! 汇总多个处理器的失败。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 配置错误 ---
    #[error("handler not found: message={0}")]
    HandlerNotFound(&'static str),
    #[error(
        "conflicting registration: message={message}, registered={registered}, rejected={rejected}"
    )]
    ConflictingRegistration {
        message: &'static str,
        registered: &'static str,
        rejected: &'static str,
    },
    #[error("middleware not registered in pipeline: {0}")]
    MiddlewareNotFound(&'static str),
    #[error("handler could not be resolved from scope: handler={0}")]
    HandlerUnresolvable(&'static str),
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    // --- 取消 ---
    #[error("operation cancelled")]
    Cancelled,

    // --- 运行时 ---
    #[error("invalid context data: {reason}")]
    InvalidContextData { reason: String },
    #[error("transport error: transport={transport}, reason={reason}")]
    Transport { transport: String, reason: String },
    #[error("{} handlers failed", .0.len())]
    Aggregate(Vec<DispatchError>),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl DispatchError {
    /// 将任意业务错误包装为处理器错误，保留原始错误以便调用方 downcast
    pub fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(anyhow::Error::new(err))
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 是否为结构性的配置错误（启动期即可发现，重试无意义）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound(_)
                | Self::ConflictingRegistration { .. }
                | Self::MiddlewareNotFound(_)
                | Self::HandlerUnresolvable(_)
                | Self::InvalidArgument { .. }
                | Self::TypeMismatch { .. }
        )
    }

    /// 聚合错误的内部错误列表；非聚合错误返回空切片
    pub fn inner_errors(&self) -> &[DispatchError] {
        match self {
            Self::Aggregate(errors) => errors,
            _ => &[],
        }
    }

    /// 将多个失败合并为单一结果：0 个成功、1 个原样返回、多个聚合
    pub fn combine(mut errors: Vec<DispatchError>) -> Result<(), DispatchError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::InvalidContextData {
            reason: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for DispatchError {
    fn from(err: base64::DecodeError) -> Self {
        DispatchError::InvalidContextData {
            reason: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for DispatchError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DispatchError::InvalidContextData {
            reason: err.to_string(),
        }
    }
}
