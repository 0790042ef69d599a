use crate::context::AmbientContext;
use crate::error::DispatchResult;
use crate::scope::ScopeRef;
use async_trait::async_trait;
use bon::Builder;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 单个处理器的调用入口（已绑定消息、上下文与管道）
#[async_trait]
pub trait InvokeHandler: Send + Sync {
    fn handler_name(&self) -> &str;

    async fn invoke(&self, scope: &ScopeRef, cancellation: CancellationToken) -> DispatchResult<()>;
}

pub type HandlerInvoker = Arc<dyn InvokeHandler>;

/// 一次广播的上下文
#[derive(Builder, Clone)]
pub struct BroadcastContext {
    scope: ScopeRef,
    signal: Arc<dyn Any + Send + Sync>,
    signal_name: &'static str,
    #[builder(into)]
    transport_name: String,
    #[builder(default)]
    cancellation: CancellationToken,
    context: AmbientContext,
}

impl BroadcastContext {
    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// 被广播的信号（类型擦除）
    pub fn signal(&self) -> &(dyn Any + Send + Sync) {
        self.signal.as_ref()
    }

    pub fn signal_name(&self) -> &'static str {
        self.signal_name
    }

    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn context(&self) -> &AmbientContext {
        &self.context
    }
}

/// 广播策略
#[async_trait]
pub trait BroadcastingStrategy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn broadcast(
        &self,
        invokers: Vec<HandlerInvoker>,
        ctx: BroadcastContext,
    ) -> DispatchResult<()>;
}
