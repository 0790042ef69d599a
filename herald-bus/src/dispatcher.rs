//! 分发器（Dispatcher）
//!
//! 编排一次分发：
//! 1. 解析处理器（请求恰好一个，信号零到多个）；
//! 2. 构建处理方管道与调用方管道，按“调用方在前”拼接；
//! 3. 建立（或复用父级派生）环境上下文；
//! 4. 执行调用链，信号交给广播策略。
//!
//! 调用入口见 `RequestClient` 与 `SignalPublisher`；远端到达的消息由
//! `receive`/`receive_signal` 处理。
//!
use crate::client::{RequestClient, SignalPublisher};
use crate::config::DispatcherConfig;
use crate::invoker::signal_invokers;
use bon::Builder;
use futures_util::future::BoxFuture;
use herald_core::broadcast::{BroadcastContext, BroadcastingStrategy};
use herald_core::context::{AmbientContext, ContextScope};
use herald_core::error::DispatchResult;
use herald_core::handler::HandlerContext;
use herald_core::message::{Message, Request, Signal};
use herald_core::pipeline::{
    Pipeline, PipelineBuilder, PipelineChain, PipelineConfigurator, Terminal, TransportRole,
    TransportType,
};
use herald_core::registry::{HandlerRegistry, TypedRegistration};
use herald_core::scope::{ScopeRef, SimpleScope};
use herald_core::transport::{ContextHeaders, TransportClient};
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 进程内分发器；克隆共享注册表与根作用域
#[derive(Builder, Clone)]
pub struct Dispatcher {
    #[builder(default)]
    registry: HandlerRegistry,
    #[builder(default = SimpleScope::empty())]
    root_scope: ScopeRef,
    #[builder(default)]
    config: DispatcherConfig,
    /// 覆盖配置中的默认广播策略
    default_strategy: Option<Arc<dyn BroadcastingStrategy>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Dispatcher {
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn root_scope(&self) -> &ScopeRef {
        &self.root_scope
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 未在调用处指定策略时使用的广播策略
    pub fn default_strategy(&self) -> Arc<dyn BroadcastingStrategy> {
        self.default_strategy
            .clone()
            .unwrap_or_else(|| self.config.broadcast.strategy())
    }

    pub fn request<M: Request>(&self) -> RequestClient<'_, M> {
        RequestClient::new(self)
    }

    pub fn signals<S: Signal>(&self) -> SignalPublisher<'_, S> {
        SignalPublisher::new(self)
    }

    /// 以默认选项执行请求
    pub async fn execute<M: Request>(&self, message: M) -> DispatchResult<M::Response> {
        self.request::<M>().execute(message).await
    }

    /// 以默认选项发布信号
    pub async fn publish<S: Signal>(&self, signal: S) -> DispatchResult<()> {
        self.signals::<S>().publish(signal).await
    }

    /// 处理经由传输到达的请求，返回响应与需回传的上行数据
    pub async fn receive<M: Request>(
        &self,
        message: M,
        headers: &ContextHeaders,
        transport: TransportType,
        cancellation: CancellationToken,
    ) -> DispatchResult<(M::Response, ContextHeaders)> {
        let operation = ContextScope::adopt(AmbientContext::from_headers(headers)?);
        let context = operation.context().clone();
        let scope = self.root_scope.clone();
        let receiver = transport.with_role(TransportRole::Receiver);

        let response = operation
            .run(async {
                tracing::debug!(
                    message_name = M::NAME,
                    transport = %receiver,
                    trace_id = context.trace_id(),
                    operation_id = context.operation_id(),
                    "receiving request"
                );

                let registration = self.registry.resolve_request::<M>()?;
                let pipeline = registration.build_pipeline(&scope, receiver.clone())?;
                let terminal =
                    local_terminal(registration, scope.clone(), context.clone(), receiver.clone());

                PipelineChain::new([pipeline], context.clone(), terminal)
                    .execute(message, cancellation)
                    .await
            })
            .await?;

        Ok((response, context.upstream_headers()))
    }

    /// 处理经由传输到达的信号，广播给本地处理器
    pub async fn receive_signal<S: Signal>(
        &self,
        signal: S,
        headers: &ContextHeaders,
        transport: TransportType,
        cancellation: CancellationToken,
    ) -> DispatchResult<ContextHeaders> {
        let operation = ContextScope::adopt(AmbientContext::from_headers(headers)?);
        let context = operation.context().clone();
        let scope = self.root_scope.clone();
        let receiver = transport.with_role(TransportRole::Receiver);

        operation
            .run(async {
                tracing::debug!(
                    message_name = S::NAME,
                    transport = %receiver,
                    trace_id = context.trace_id(),
                    operation_id = context.operation_id(),
                    "receiving signal"
                );

                let invokers = signal_invokers(
                    &self.registry,
                    Arc::from(Vec::new()),
                    receiver.clone(),
                    receiver.clone(),
                    &signal,
                    &context,
                )?;

                let signal: Arc<dyn Any + Send + Sync> = Arc::new(signal.clone());
                let ctx = BroadcastContext::builder()
                    .scope(scope.clone())
                    .signal(signal)
                    .signal_name(S::NAME)
                    .transport_name(receiver.name().to_string())
                    .cancellation(cancellation)
                    .context(context.clone())
                    .build();

                self.default_strategy().broadcast(invokers, ctx).await
            })
            .await?;

        Ok(context.upstream_headers())
    }
}

/// 调用链末端：从作用域取得处理器并调用
pub(crate) fn local_terminal<M: Message>(
    registration: Arc<TypedRegistration<M>>,
    scope: ScopeRef,
    context: AmbientContext,
    transport: TransportType,
) -> Terminal<M> {
    Arc::new(
        move |message: M, cancellation: CancellationToken| -> BoxFuture<'static, DispatchResult<M::Response>> {
            let registration = registration.clone();
            let ctx = HandlerContext::new(
                context.clone(),
                cancellation,
                scope.clone(),
                transport.clone(),
            );
            Box::pin(async move {
                let handler = registration.resolve(ctx.scope())?;
                handler.handle(&ctx, message).await
            })
        },
    )
}

/// 调用链末端：交给远程传输
pub(crate) fn remote_terminal<M: Message>(
    client: Arc<dyn TransportClient<M>>,
    scope: ScopeRef,
    context: AmbientContext,
) -> Terminal<M> {
    Arc::new(
        move |message: M, cancellation: CancellationToken| -> BoxFuture<'static, DispatchResult<M::Response>> {
            let client = client.clone();
            let scope = scope.clone();
            let context = context.clone();
            Box::pin(async move { client.execute(message, scope, context, cancellation).await })
        },
    )
}

/// 依次执行调用方配置，构建调用方管道
pub(crate) fn caller_pipeline<M: Message>(
    configurators: &[PipelineConfigurator<M>],
    scope: &ScopeRef,
    transport: TransportType,
) -> DispatchResult<Pipeline<M>> {
    let mut builder = PipelineBuilder::new(scope.clone(), transport);
    for configurator in configurators {
        builder.apply(configurator)?;
    }
    Ok(builder.build())
}
