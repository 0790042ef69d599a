//! 传输边界契约
//!
//! 核心不实现任何具体传输。调用方通过 `TransportClient` 把消息交给远端，
//! 上下文以 `ContextHeaders` 的形式随消息一起传递：
//! - 发送前调用 `AmbientContext::outgoing_headers()`；
//! - 远端响应携带的上行数据通过 `AmbientContext::accept_upstream()` 合并回来。
//!
use crate::context::AmbientContext;
use crate::error::DispatchResult;
use crate::message::Message;
use crate::pipeline::TransportType;
use crate::scope::ScopeRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// 随消息跨进程传递的上下文头
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// 编码后的上下文数据，格式见 `context::codec`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ContextHeaders {
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none() && self.data.is_none()
    }
}

/// 调用方一侧的远程传输
#[async_trait]
pub trait TransportClient<M: Message>: Send + Sync + 'static {
    fn transport_type(&self) -> TransportType;

    async fn execute(
        &self,
        message: M,
        scope: ScopeRef,
        context: AmbientContext,
        cancellation: CancellationToken,
    ) -> DispatchResult<M::Response>;
}
