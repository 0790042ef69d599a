//! 处理器协议
//!
//! 命令、查询、信号共用同一个 `Handler<M>` trait；信号处理器的响应固定为 `()`。
//! 处理器可以通过 `configure_pipeline` 声明自己一侧的中间件。
//!
use crate::context::AmbientContext;
use crate::error::{DispatchError, DispatchResult};
use crate::message::Message;
use crate::pipeline::{PipelineBuilder, TransportType};
use crate::scope::ScopeRef;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// 处理器执行参数
#[derive(Clone)]
pub struct HandlerContext {
    context: AmbientContext,
    cancellation: CancellationToken,
    scope: ScopeRef,
    transport: TransportType,
}

impl HandlerContext {
    pub fn new(
        context: AmbientContext,
        cancellation: CancellationToken,
        scope: ScopeRef,
        transport: TransportType,
    ) -> Self {
        Self {
            context,
            cancellation,
            scope,
            transport,
        }
    }

    pub fn context(&self) -> &AmbientContext {
        &self.context
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    pub fn transport(&self) -> &TransportType {
        &self.transport
    }

    /// 令牌已取消时返回 `Cancelled`
    pub fn check_cancelled(&self) -> DispatchResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, ctx: &HandlerContext, message: M) -> DispatchResult<M::Response>;

    /// 处理方管道配置，默认不添加中间件
    fn configure_pipeline(_pipeline: &mut PipelineBuilder<M>) -> DispatchResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// 把普通异步函数适配为处理器
pub struct FnHandler<M, F> {
    f: F,
    _marker: PhantomData<fn(M)>,
}

impl<M, F> FnHandler<M, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<M, F, Fut> Handler<M> for FnHandler<M, F>
where
    M: Message,
    F: Fn(HandlerContext, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<M::Response>> + Send + 'static,
{
    async fn handle(&self, ctx: &HandlerContext, message: M) -> DispatchResult<M::Response> {
        (self.f)(ctx.clone(), message).await
    }
}
