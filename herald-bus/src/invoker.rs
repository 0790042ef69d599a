use crate::dispatcher::{caller_pipeline, local_terminal};
use async_trait::async_trait;
use herald_core::broadcast::{HandlerInvoker, InvokeHandler};
use herald_core::context::AmbientContext;
use herald_core::error::DispatchResult;
use herald_core::message::Signal;
use herald_core::pipeline::{PipelineChain, PipelineConfigurator, TransportType};
use herald_core::registry::{HandlerRegistry, TypedRegistration};
use herald_core::scope::ScopeRef;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 绑定了信号与上下文的单个处理器调用
///
/// 管道在 `invoke` 时以策略给出的作用域构建，中间件、处理方管道配置与处理器
/// 看到的是同一个作用域；构建失败只影响这一个处理器。
struct SignalInvoker<S: Signal> {
    registration: Arc<TypedRegistration<S>>,
    configurators: Arc<[PipelineConfigurator<S>]>,
    caller: TransportType,
    receiver: TransportType,
    signal: S,
    context: AmbientContext,
}

#[async_trait]
impl<S: Signal> InvokeHandler for SignalInvoker<S> {
    fn handler_name(&self) -> &str {
        self.registration.handler_name()
    }

    async fn invoke(&self, scope: &ScopeRef, cancellation: CancellationToken) -> DispatchResult<()> {
        let handler = self
            .registration
            .build_pipeline(scope, self.receiver.clone())?;
        let caller = caller_pipeline(&self.configurators, scope, self.caller.clone())?;
        let terminal = local_terminal(
            self.registration.clone(),
            scope.clone(),
            self.context.clone(),
            self.receiver.clone(),
        );
        PipelineChain::new([caller, handler], self.context.clone(), terminal)
            .execute(self.signal.clone(), cancellation)
            .await
    }
}

/// 为信号的每个处理器创建调用入口；管道推迟到调用时构建
pub(crate) fn signal_invokers<S: Signal>(
    registry: &HandlerRegistry,
    configurators: Arc<[PipelineConfigurator<S>]>,
    caller: TransportType,
    receiver: TransportType,
    signal: &S,
    context: &AmbientContext,
) -> DispatchResult<Vec<HandlerInvoker>> {
    Ok(registry
        .resolve_all::<S>()?
        .into_iter()
        .map(|registration| {
            Arc::new(SignalInvoker {
                registration,
                configurators: configurators.clone(),
                caller: caller.clone(),
                receiver: receiver.clone(),
                signal: signal.clone(),
                context: context.clone(),
            }) as HandlerInvoker
        })
        .collect())
}
