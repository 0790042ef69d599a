use super::builder::Pipeline;
use super::middleware::{Middleware, MiddlewareContext, Next};
use super::transport_type::TransportType;
use crate::context::AmbientContext;
use crate::error::DispatchResult;
use crate::message::Message;
use crate::scope::ScopeRef;
use futures_core::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 调用链末端：调用处理器（或远程传输）
pub type Terminal<M> = Arc<
    dyn Fn(M, CancellationToken) -> BoxFuture<'static, DispatchResult<<M as Message>::Response>>
        + Send
        + Sync,
>;

struct Stage<M: Message> {
    middleware: Arc<dyn Middleware<M>>,
    transport: TransportType,
    scope: ScopeRef,
}

/// 执行中的调用链（Executing 阶段）
///
/// 由若干管道按给定顺序（调用方在前、处理方在后）拼接而成，末端为 `Terminal`。
pub struct PipelineChain<M: Message> {
    stages: Vec<Stage<M>>,
    terminal: Terminal<M>,
    context: AmbientContext,
}

impl<M: Message> PipelineChain<M> {
    pub fn new(
        pipelines: impl IntoIterator<Item = Pipeline<M>>,
        context: AmbientContext,
        terminal: Terminal<M>,
    ) -> Arc<Self> {
        let stages = pipelines
            .into_iter()
            .flat_map(|pipeline| {
                let Pipeline {
                    scope,
                    transport,
                    middlewares,
                } = pipeline;
                middlewares.into_iter().map(move |middleware| Stage {
                    middleware,
                    transport: transport.clone(),
                    scope: scope.clone(),
                })
            })
            .collect();

        Arc::new(Self {
            stages,
            terminal,
            context,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.middleware.name()).collect()
    }

    /// 从第一个中间件开始执行
    pub async fn execute(
        self: Arc<Self>,
        message: M,
        cancellation: CancellationToken,
    ) -> DispatchResult<M::Response> {
        self.invoke(0, message, cancellation).await
    }

    pub(crate) fn invoke(
        self: &Arc<Self>,
        index: usize,
        message: M,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, DispatchResult<M::Response>> {
        let Some(stage) = self.stages.get(index) else {
            return (self.terminal)(message, cancellation);
        };

        let middleware = stage.middleware.clone();
        let ctx = MiddlewareContext {
            message,
            cancellation,
            context: self.context.clone(),
            transport: stage.transport.clone(),
            scope: stage.scope.clone(),
            next: Next {
                chain: self.clone(),
                index: index + 1,
            },
        };

        Box::pin(async move { middleware.execute(ctx).await })
    }
}
