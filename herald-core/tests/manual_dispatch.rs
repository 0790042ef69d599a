//! 不借助分发器，直接用注册表、作用域、管道与上下文组合一次调用
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use herald_core::context::AmbientContext;
use herald_core::error::DispatchResult;
use herald_core::handler::{Handler, HandlerContext};
use herald_core::pipeline::{
    Middleware, MiddlewareContext, PipelineBuilder, PipelineChain, Terminal, TransportRole,
    TransportType,
};
use herald_core::registry::{HandlerRegistry, HandlerSource};
use herald_core::scope::{ScopeRef, ServiceScope, SimpleScope};
use herald_macros::command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

#[command(response = (usize, bool))]
struct Tick;

static INSTANCES: AtomicUsize = AtomicUsize::new(0);

/// 每个作用域一个实例，响应实例编号与是否能读到当前上下文
struct TickHandler {
    id: usize,
}

#[async_trait]
impl Handler<Tick> for TickHandler {
    async fn handle(&self, ctx: &HandlerContext, _message: Tick) -> DispatchResult<(usize, bool)> {
        let current = AmbientContext::current().is_some_and(|c| c.ptr_eq(ctx.context()));
        Ok((self.id, current))
    }

    fn configure_pipeline(pipeline: &mut PipelineBuilder<Tick>) -> DispatchResult<()> {
        pipeline.use_middleware(Counting::default());
        Ok(())
    }
}

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl Middleware<Tick> for Counting {
    async fn execute(&self, ctx: MiddlewareContext<Tick>) -> DispatchResult<(usize, bool)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.proceed().await
    }
}

fn scope() -> ScopeRef {
    SimpleScope::builder()
        .scoped(|_| TickHandler {
            id: INSTANCES.fetch_add(1, Ordering::SeqCst),
        })
        .build()
}

fn terminal(
    registry: &HandlerRegistry,
    scope: ScopeRef,
    context: AmbientContext,
) -> Terminal<Tick> {
    let registration = registry.resolve_request::<Tick>().unwrap();
    Arc::new(
        move |message: Tick, token: CancellationToken| -> BoxFuture<'static, DispatchResult<(usize, bool)>> {
            let ctx = HandlerContext::new(
                context.clone(),
                token,
                scope.clone(),
                TransportType::in_process(TransportRole::Receiver),
            );
            let registration = registration.clone();
            Box::pin(async move {
                let handler = registration.resolve(ctx.scope())?;
                handler.handle(&ctx, message).await
            })
        },
    )
}

#[tokio::test]
async fn scoped_handler_runs_through_declared_pipeline() {
    let registry = HandlerRegistry::default();
    registry.register_scoped::<Tick, TickHandler>().unwrap();

    let registration = registry.resolve_request::<Tick>().unwrap();
    assert_eq!(registration.source(), HandlerSource::Scoped);

    let root = scope();
    let first = root.create_child_scope();
    let second = root.create_child_scope();

    let run = |scope: ScopeRef| {
        let registry = registry.clone();
        async move {
            let operation = AmbientContext::begin_operation(None);
            let context = operation.context().clone();
            let pipeline = registry
                .resolve_request::<Tick>()
                .and_then(|r| {
                    r.build_pipeline(&scope, TransportType::in_process(TransportRole::Receiver))
                })
                .unwrap();
            assert_eq!(pipeline.len(), 1);

            let terminal = terminal(&registry, scope, context.clone());
            let chain = PipelineChain::new([pipeline], context, terminal);
            operation
                .run(chain.execute(Tick, CancellationToken::new()))
                .await
        }
    };

    let (a1, seen_current) = run(first.clone()).await.unwrap();
    let (a2, _) = run(first).await.unwrap();
    let (b, _) = run(second).await.unwrap();

    assert!(seen_current);
    assert_eq!(a1, a2);
    assert_ne!(a1, b);
}

#[tokio::test]
async fn spawned_tasks_do_not_inherit_the_current_context() {
    let operation = AmbientContext::begin_operation(None);
    let context = operation.context().clone();

    let (inside, spawned) = operation
        .run(async {
            let inside = AmbientContext::current();
            let spawned = tokio::spawn(async { AmbientContext::current() })
                .await
                .unwrap();
            (inside, spawned)
        })
        .await;

    assert!(inside.is_some_and(|c| c.ptr_eq(&context)));
    assert!(spawned.is_none());
    assert!(context.is_ended());
    assert!(AmbientContext::current().is_none());
}
