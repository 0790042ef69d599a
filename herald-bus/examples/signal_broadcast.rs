use herald_bus::{Dispatcher, DispatcherConfig};
use herald_core::broadcast::{FailurePolicy, SequentialBroadcast};
use herald_core::error::DispatchError;
use herald_core::handler::HandlerContext;
use herald_macros::signal;
use std::time::Duration;

#[signal(name = "user.registered")]
struct UserRegistered {
    user_id: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("crm sync failed for user {0}")]
struct CrmSyncFailed(u32);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = DispatcherConfig::from_json(
        r#"{ "broadcast": { "strategy": "parallel", "max_degree_of_parallelism": 2 } }"#,
    )?;
    let dispatcher = Dispatcher::builder().config(config).build();

    let registry = dispatcher.registry();
    registry.register_fn(|_ctx: HandlerContext, s: UserRegistered| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        println!("welcome email queued for user {}", s.user_id);
        Ok(())
    })?;
    registry.register_fn(|ctx: HandlerContext, s: UserRegistered| async move {
        println!(
            "audit: user {} registered (trace {})",
            s.user_id,
            ctx.context().trace_id()
        );
        Ok(())
    })?;
    registry.register_fn(|_ctx: HandlerContext, s: UserRegistered| async move {
        Err(DispatchError::handler(CrmSyncFailed(s.user_id)))
    })?;

    // 默认策略：有界并行
    if let Err(err) = dispatcher.publish(UserRegistered { user_id: 7 }).await {
        println!("parallel broadcast failed: {err}");
    }

    // 调用处覆盖：顺序执行并在全部完成后汇总失败
    let err = dispatcher
        .signals::<UserRegistered>()
        .with_strategy(SequentialBroadcast::new(FailurePolicy::ThrowAfterAll))
        .publish(UserRegistered { user_id: 8 })
        .await;
    println!("sequential broadcast result: {err:?}");

    Ok(())
}
