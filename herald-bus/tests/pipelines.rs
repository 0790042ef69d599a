use async_trait::async_trait;
use herald_bus::Dispatcher;
use herald_bus::middleware::{LoggingMiddleware, PayloadLoggingStrategy, RetryMiddleware};
use herald_core::error::{DispatchError, DispatchResult};
use herald_core::handler::{Handler, HandlerContext};
use herald_core::pipeline::{
    Middleware, MiddlewareContext, PipelineBuilder, TransportRole, upcast_self, upcast_self_mut,
};
use herald_macros::{command, query};
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;

/// 每个中间件在路径上追加一个标记
#[query(response = Vec<String>)]
#[derive(serde::Serialize)]
struct Route {
    path: Vec<String>,
}

impl Route {
    fn through(&self, stop: impl Into<String>) -> Route {
        let mut path = self.path.clone();
        path.push(stop.into());
        Route { path }
    }
}

struct Stamp {
    label: String,
}

impl Stamp {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

#[async_trait]
impl Middleware<Route> for Stamp {
    async fn execute(&self, ctx: MiddlewareContext<Route>) -> DispatchResult<Vec<String>> {
        let role = match ctx.transport.role() {
            TransportRole::Caller => "c",
            TransportRole::Receiver => "r",
        };
        let message = ctx.message.through(format!("{}:{role}", self.label));
        ctx.next.run(message, ctx.cancellation).await
    }
}

/// 另一种中间件类型，用于验证按类型移除
struct Marker;

#[async_trait]
impl Middleware<Route> for Marker {
    async fn execute(&self, ctx: MiddlewareContext<Route>) -> DispatchResult<Vec<String>> {
        let message = ctx.message.through("marker");
        ctx.next.run(message, ctx.cancellation).await
    }
}

/// 内嵌 `Stamp` 并把标签转成大写
struct ShoutingStamp {
    base: Stamp,
}

#[async_trait]
impl Middleware<Route> for ShoutingStamp {
    async fn execute(&self, ctx: MiddlewareContext<Route>) -> DispatchResult<Vec<String>> {
        let message = ctx.message.through(self.base.label.to_uppercase());
        ctx.next.run(message, ctx.cancellation).await
    }

    fn upcast(&self, ty: TypeId) -> Option<&dyn Any> {
        if ty == TypeId::of::<Stamp>() {
            return Some(&self.base);
        }
        upcast_self(self, ty)
    }

    fn upcast_mut(&mut self, ty: TypeId) -> Option<&mut dyn Any> {
        if ty == TypeId::of::<Stamp>() {
            return Some(&mut self.base);
        }
        upcast_self_mut(self, ty)
    }
}

struct RouteHandler;

#[async_trait]
impl Handler<Route> for RouteHandler {
    async fn handle(&self, _ctx: &HandlerContext, message: Route) -> DispatchResult<Vec<String>> {
        Ok(message.path)
    }

    fn configure_pipeline(pipeline: &mut PipelineBuilder<Route>) -> DispatchResult<()> {
        pipeline.use_middleware(Stamp::new("handler"));
        Ok(())
    }
}

fn dispatcher() -> Dispatcher {
    let dispatcher = Dispatcher::default();
    dispatcher.registry().register(RouteHandler).unwrap();
    dispatcher
}

fn route() -> Route {
    Route { path: Vec::new() }
}

#[tokio::test]
async fn caller_middlewares_run_before_handler_middlewares() {
    let path = dispatcher()
        .request::<Route>()
        .with_pipeline(|p| {
            p.use_middleware(Stamp::new("first"));
            Ok(())
        })
        .with_pipeline(|p| {
            p.use_middleware(Stamp::new("second"));
            Ok(())
        })
        .execute(route())
        .await
        .unwrap();

    assert_eq!(path, vec!["first:c", "second:c", "handler:r"]);
}

#[tokio::test]
async fn without_removes_previously_added_middleware() {
    let path = dispatcher()
        .request::<Route>()
        .with_pipeline(|p| {
            p.use_middleware(Marker).use_middleware(Stamp::new("kept"));
            Ok(())
        })
        .with_pipeline(|p| {
            p.without::<Marker>();
            Ok(())
        })
        .execute(route())
        .await
        .unwrap();

    assert_eq!(path, vec!["kept:c", "handler:r"]);
}

#[tokio::test]
async fn configure_base_type_reaches_embedding_middleware() {
    let path = dispatcher()
        .request::<Route>()
        .with_pipeline(|p| {
            p.use_middleware(ShoutingStamp {
                base: Stamp::new("quiet"),
            });
            p.configure::<Stamp, _>(|stamp| stamp.label = "configured".into())?;
            Ok(())
        })
        .execute(route())
        .await
        .unwrap();

    assert_eq!(path, vec!["CONFIGURED", "handler:r"]);
}

#[tokio::test]
async fn configure_without_match_fails_the_dispatch() {
    let err = dispatcher()
        .request::<Route>()
        .with_pipeline(|p| {
            p.use_middleware(Marker);
            p.configure::<Stamp, _>(|stamp| stamp.label.clear())?;
            Ok(())
        })
        .execute(route())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::MiddlewareNotFound(_)));
}

#[command(response = usize)]
#[derive(serde::Serialize)]
struct Flaky {
    succeed_on: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("transient failure")]
struct Transient;

fn flaky_dispatcher(calls: Arc<AtomicUsize>) -> Dispatcher {
    let dispatcher = Dispatcher::default();
    dispatcher
        .registry()
        .register_fn(move |_ctx: HandlerContext, m: Flaky| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if m.succeed_on == 0 {
                    return Err(DispatchError::invalid_argument(format!(
                        "bad input on attempt {attempt}"
                    )));
                }
                if attempt >= m.succeed_on {
                    Ok(attempt)
                } else {
                    Err(DispatchError::handler(Transient))
                }
            }
        })
        .unwrap();
    dispatcher
}

#[tokio::test]
async fn retry_reinvokes_the_rest_of_the_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let attempts = flaky_dispatcher(calls.clone())
        .request::<Flaky>()
        .with_pipeline(|p| {
            p.use_middleware(RetryMiddleware::new(3));
            Ok(())
        })
        .execute(Flaky { succeed_on: 3 })
        .await
        .unwrap();

    assert_eq!(attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = flaky_dispatcher(calls.clone())
        .request::<Flaky>()
        .with_pipeline(|p| {
            p.use_middleware(RetryMiddleware::default());
            p.configure::<RetryMiddleware, _>(|r| r.max_attempts = 2)?;
            Ok(())
        })
        .execute(Flaky { succeed_on: 5 })
        .await
        .unwrap_err();

    assert!(matches!(&err, DispatchError::Handler(e) if e.is::<Transient>()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn configuration_errors_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = flaky_dispatcher(calls.clone())
        .request::<Flaky>()
        .with_pipeline(|p| {
            p.use_middleware(RetryMiddleware::new(5));
            Ok(())
        })
        .execute(Flaky { succeed_on: 0 })
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logging_passes_responses_and_errors_through() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .try_init();

    let logged = |p: &mut PipelineBuilder<Route>| -> DispatchResult<()> {
        p.use_middleware(LoggingMiddleware::new());
        p.configure::<LoggingMiddleware, _>(|m| {
            m.pre_level = Level::INFO;
            m.payload = PayloadLoggingStrategy::IndentedJson;
            m.response_payload = PayloadLoggingStrategy::MinimalJson;
        })?;
        Ok(())
    };

    let path = dispatcher()
        .request::<Route>()
        .with_pipeline(logged)
        .execute(route())
        .await
        .unwrap();
    assert_eq!(path, vec!["handler:r"]);

    let failing = Dispatcher::default();
    failing
        .registry()
        .register_fn(|_ctx: HandlerContext, _m: Route| async {
            Err(DispatchError::handler(Transient))
        })
        .unwrap();

    let err = failing
        .request::<Route>()
        .with_pipeline(logged)
        .execute(route())
        .await
        .unwrap_err();
    assert!(matches!(&err, DispatchError::Handler(e) if e.is::<Transient>()));
}

#[derive(Debug, PartialEq)]
struct Logged {
    hook: &'static str,
    category: String,
    payload: Option<String>,
    failed: bool,
}

#[tokio::test]
async fn logging_hooks_see_rendered_payloads() {
    let logged: Arc<std::sync::Mutex<Vec<Logged>>> = Arc::default();
    let record = |hook: &'static str| {
        let logged = logged.clone();
        move |r: &herald_bus::middleware::LogRecord<'_>| {
            logged.lock().unwrap().push(Logged {
                hook,
                category: r.category.to_string(),
                payload: r.payload.map(str::to_string),
                failed: r.error.is_some(),
            });
        }
    };
    let logging = LoggingMiddleware::new()
        .with_category("audit")
        .with_payload_factory(|name| match name {
            "Route" => PayloadLoggingStrategy::MinimalJson,
            _ => PayloadLoggingStrategy::Omit,
        })
        .on_before(record("before"))
        .on_after(record("after"))
        .on_error(record("error"));

    let hooked = logging.clone();
    let path = dispatcher()
        .request::<Route>()
        .with_pipeline(move |p| {
            p.use_middleware(hooked.clone());
            p.configure::<LoggingMiddleware, _>(|m| {
                m.response_payload = PayloadLoggingStrategy::MinimalJson;
            })?;
            Ok(())
        })
        .execute(route())
        .await
        .unwrap();
    assert_eq!(path, vec!["handler:r"]);

    let calls = Arc::new(AtomicUsize::new(0));
    flaky_dispatcher(calls)
        .request::<Flaky>()
        .with_pipeline(move |p| {
            p.use_middleware(logging.clone());
            Ok(())
        })
        .execute(Flaky { succeed_on: 2 })
        .await
        .unwrap_err();

    let logged = logged.lock().unwrap();
    assert_eq!(
        *logged,
        vec![
            Logged {
                hook: "before",
                category: "audit".into(),
                payload: Some(r#"{"path":[]}"#.into()),
                failed: false,
            },
            Logged {
                hook: "after",
                category: "audit".into(),
                payload: Some(r#"["handler:r"]"#.into()),
                failed: false,
            },
            Logged {
                hook: "before",
                category: "audit".into(),
                payload: None,
                failed: false,
            },
            Logged {
                hook: "error",
                category: "audit".into(),
                payload: None,
                failed: true,
            },
        ]
    );
}
