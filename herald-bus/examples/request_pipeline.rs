use async_trait::async_trait;
use herald_bus::Dispatcher;
use herald_bus::middleware::{LoggingMiddleware, RetryMiddleware};
use herald_core::error::{DispatchError, DispatchResult};
use herald_core::handler::{Handler, HandlerContext};
use herald_core::pipeline::PipelineBuilder;
use herald_macros::{command, query};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[query(response = String)]
#[derive(Serialize)]
struct GetGreeting {
    name: String,
}

struct GetGreetingHandler;

#[async_trait]
impl Handler<GetGreeting> for GetGreetingHandler {
    async fn handle(&self, ctx: &HandlerContext, q: GetGreeting) -> DispatchResult<String> {
        let locale = ctx
            .context()
            .downstream("locale")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "en".into());
        Ok(match locale.as_str() {
            "zh" => format!("你好，{}", q.name),
            _ => format!("Hello, {}", q.name),
        })
    }

    // 处理方管道：每次调用都记录日志
    fn configure_pipeline(pipeline: &mut PipelineBuilder<GetGreeting>) -> DispatchResult<()> {
        pipeline.use_middleware(LoggingMiddleware::new());
        Ok(())
    }
}

#[command]
#[derive(Serialize)]
struct SendEmail {
    to: String,
}

#[derive(Debug, thiserror::Error)]
#[error("smtp temporarily unavailable")]
struct SmtpUnavailable;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let dispatcher = Dispatcher::default();
    dispatcher.registry().register(GetGreetingHandler)?;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    dispatcher
        .registry()
        .register_fn(move |_ctx: HandlerContext, cmd: SendEmail| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    return Err(DispatchError::handler(SmtpUnavailable));
                }
                println!("email sent to {} on attempt {attempt}", cmd.to);
                Ok(())
            }
        })?;

    let greeting = dispatcher
        .execute(GetGreeting {
            name: "Alice".into(),
        })
        .await?;
    println!("{greeting}");

    // 调用方管道：在处理方管道之前执行
    dispatcher
        .request::<SendEmail>()
        .with_pipeline(|p| {
            p.use_middleware(LoggingMiddleware::new())
                .use_middleware(RetryMiddleware::new(5).with_delay(Duration::from_millis(20)));
            Ok(())
        })
        .execute(SendEmail {
            to: "alice@example.com".into(),
        })
        .await?;

    println!("total attempts: {}", attempts.load(Ordering::SeqCst));
    Ok(())
}
