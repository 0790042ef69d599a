//! 调用入口：请求客户端与信号发布者
//!
//! 两者都允许在调用处追加管道配置（可多次，按顺序执行），指定作用域、
//! 显式上下文、取消令牌与远程传输；信号发布者还可以指定广播策略，
//! 调用处的策略优先于分发器默认值。
//!
use crate::dispatcher::{Dispatcher, caller_pipeline, local_terminal, remote_terminal};
use crate::invoker::signal_invokers;
use herald_core::broadcast::{BroadcastContext, BroadcastingStrategy};
use herald_core::context::AmbientContext;
use herald_core::error::DispatchResult;
use herald_core::message::{Request, Signal};
use herald_core::pipeline::{
    PipelineBuilder, PipelineChain, PipelineConfigurator, TransportRole, TransportType,
};
use herald_core::scope::ScopeRef;
use herald_core::transport::TransportClient;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 请求（命令/查询）客户端
pub struct RequestClient<'a, M: Request> {
    dispatcher: &'a Dispatcher,
    configurators: Vec<PipelineConfigurator<M>>,
    scope: Option<ScopeRef>,
    context: Option<AmbientContext>,
    cancellation: CancellationToken,
    transport: Option<Arc<dyn TransportClient<M>>>,
}

impl<'a, M: Request> RequestClient<'a, M> {
    pub(crate) fn new(dispatcher: &'a Dispatcher) -> Self {
        Self {
            dispatcher,
            configurators: Vec::new(),
            scope: None,
            context: None,
            cancellation: CancellationToken::new(),
            transport: None,
        }
    }

    /// 追加调用方管道配置
    pub fn with_pipeline<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut PipelineBuilder<M>) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.configurators.push(Arc::new(configure));
        self
    }

    pub fn with_scope(mut self, scope: ScopeRef) -> Self {
        self.scope = Some(scope);
        self
    }

    /// 以给定上下文为父上下文
    pub fn with_context(mut self, context: AmbientContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 经由远程传输执行，不再查找本地处理器
    pub fn with_transport(mut self, transport: impl TransportClient<M>) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn with_shared_transport(mut self, transport: Arc<dyn TransportClient<M>>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn caller_transport(&self) -> TransportType {
        match &self.transport {
            Some(transport) => transport.transport_type().with_role(TransportRole::Caller),
            None => TransportType::in_process(TransportRole::Caller),
        }
    }

    pub async fn execute(&self, message: M) -> DispatchResult<M::Response> {
        let scope = self
            .scope
            .clone()
            .unwrap_or_else(|| self.dispatcher.root_scope().clone());
        let operation = AmbientContext::begin_operation(self.context.as_ref());
        let context = operation.context().clone();
        let cancellation = self.cancellation.clone();

        operation
            .run(async move {
                tracing::debug!(
                    message_name = M::NAME,
                    kind = %M::KIND,
                    trace_id = context.trace_id(),
                    operation_id = context.operation_id(),
                    "dispatching request"
                );

                let (handler, terminal) = match &self.transport {
                    Some(client) => (
                        None,
                        remote_terminal(client.clone(), scope.clone(), context.clone()),
                    ),
                    None => {
                        let registration = self.dispatcher.registry().resolve_request::<M>()?;
                        let receiver = TransportType::in_process(TransportRole::Receiver);
                        let pipeline = registration.build_pipeline(&scope, receiver.clone())?;
                        let terminal =
                            local_terminal(registration, scope.clone(), context.clone(), receiver);
                        (Some(pipeline), terminal)
                    }
                };
                let caller = caller_pipeline(&self.configurators, &scope, self.caller_transport())?;

                let chain = PipelineChain::new(
                    std::iter::once(caller).chain(handler),
                    context.clone(),
                    terminal,
                );
                let result = chain.execute(message, cancellation).await;

                if let Err(err) = &result {
                    tracing::debug!(
                        message_name = M::NAME,
                        trace_id = context.trace_id(),
                        operation_id = context.operation_id(),
                        error = %err,
                        "request failed"
                    );
                }
                result
            })
            .await
    }
}

/// 信号发布者
pub struct SignalPublisher<'a, S: Signal> {
    dispatcher: &'a Dispatcher,
    configurators: Vec<PipelineConfigurator<S>>,
    scope: Option<ScopeRef>,
    context: Option<AmbientContext>,
    cancellation: CancellationToken,
    transport: Option<Arc<dyn TransportClient<S>>>,
    strategy: Option<Arc<dyn BroadcastingStrategy>>,
}

impl<'a, S: Signal> SignalPublisher<'a, S> {
    pub(crate) fn new(dispatcher: &'a Dispatcher) -> Self {
        Self {
            dispatcher,
            configurators: Vec::new(),
            scope: None,
            context: None,
            cancellation: CancellationToken::new(),
            transport: None,
            strategy: None,
        }
    }

    /// 追加调用方管道配置；每个处理器各自构建一份
    pub fn with_pipeline<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut PipelineBuilder<S>) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.configurators.push(Arc::new(configure));
        self
    }

    pub fn with_scope(mut self, scope: ScopeRef) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_context(mut self, context: AmbientContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_transport(mut self, transport: impl TransportClient<S>) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// 覆盖分发器的默认广播策略
    pub fn with_strategy(mut self, strategy: impl BroadcastingStrategy) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub async fn publish(&self, signal: S) -> DispatchResult<()> {
        let scope = self
            .scope
            .clone()
            .unwrap_or_else(|| self.dispatcher.root_scope().clone());
        let operation = AmbientContext::begin_operation(self.context.as_ref());
        let context = operation.context().clone();
        let cancellation = self.cancellation.clone();

        operation
            .run(async move {
                tracing::debug!(
                    message_name = S::NAME,
                    trace_id = context.trace_id(),
                    operation_id = context.operation_id(),
                    "publishing signal"
                );

                if let Some(client) = &self.transport {
                    let transport = client.transport_type().with_role(TransportRole::Caller);
                    let caller = caller_pipeline(&self.configurators, &scope, transport)?;
                    let terminal = remote_terminal(client.clone(), scope.clone(), context.clone());
                    return PipelineChain::new([caller], context.clone(), terminal)
                        .execute(signal, cancellation)
                        .await;
                }

                let invokers = signal_invokers(
                    self.dispatcher.registry(),
                    Arc::from(self.configurators.clone()),
                    TransportType::in_process(TransportRole::Caller),
                    TransportType::in_process(TransportRole::Receiver),
                    &signal,
                    &context,
                )?;

                let strategy = self
                    .strategy
                    .clone()
                    .unwrap_or_else(|| self.dispatcher.default_strategy());

                let payload: Arc<dyn Any + Send + Sync> = Arc::new(signal);
                let ctx = BroadcastContext::builder()
                    .scope(scope.clone())
                    .signal(payload)
                    .signal_name(S::NAME)
                    .transport_name(TransportType::IN_PROCESS)
                    .cancellation(cancellation)
                    .context(context.clone())
                    .build();

                strategy.broadcast(invokers, ctx).await
            })
            .await
    }
}
