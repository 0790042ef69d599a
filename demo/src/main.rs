use async_trait::async_trait;
use herald_bus::middleware::{LoggingMiddleware, RetryMiddleware};
use herald_bus::{Dispatcher, DispatcherConfig};
use herald_core::context::AmbientContext;
use herald_core::error::{DispatchError, DispatchResult};
use herald_core::handler::{Handler, HandlerContext};
use herald_core::pipeline::PipelineBuilder;
use herald_core::scope::SimpleScope;
use herald_macros::{command, query, signal};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
enum InventoryError {
    #[error("unknown sku: {0}")]
    UnknownSku(String),
    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u32,
        available: u32,
    },
}

/// 单例库存仓储，由作用域解析
#[derive(Default)]
struct StockRepository {
    levels: Mutex<HashMap<String, u32>>,
}

impl StockRepository {
    fn seeded(items: &[(&str, u32)]) -> Self {
        let levels = items.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self {
            levels: Mutex::new(levels),
        }
    }
}

#[command(name = "inventory.reserve", response = u32)]
#[derive(Serialize)]
struct ReserveStock {
    sku: String,
    quantity: u32,
}

#[query(name = "inventory.level", response = u32)]
#[derive(Serialize)]
struct StockLevel {
    sku: String,
}

#[signal(name = "inventory.reserved")]
struct StockReserved {
    sku: String,
    remaining: u32,
}

fn repository(ctx: &HandlerContext) -> DispatchResult<Arc<StockRepository>> {
    ctx.scope()
        .resolve::<StockRepository>()
        .ok_or_else(|| DispatchError::invalid_argument("stock repository not registered"))
}

struct ReserveStockHandler {
    dispatcher: Dispatcher,
}

#[async_trait]
impl Handler<ReserveStock> for ReserveStockHandler {
    async fn handle(&self, ctx: &HandlerContext, cmd: ReserveStock) -> DispatchResult<u32> {
        ctx.check_cancelled()?;
        let remaining = {
            let repo = repository(ctx)?;
            let mut levels = repo.levels.lock().map_err(|_| {
                DispatchError::invalid_argument("stock repository lock poisoned")
            })?;
            let available = levels
                .get_mut(&cmd.sku)
                .ok_or_else(|| DispatchError::handler(InventoryError::UnknownSku(cmd.sku.clone())))?;
            if *available < cmd.quantity {
                return Err(DispatchError::handler(InventoryError::InsufficientStock {
                    sku: cmd.sku,
                    requested: cmd.quantity,
                    available: *available,
                }));
            }
            *available -= cmd.quantity;
            *available
        };

        ctx.context().set_upstream("reserved", cmd.quantity);

        // 嵌套分发：沿用当前 trace，开启新的 operation
        self.dispatcher
            .publish(StockReserved {
                sku: cmd.sku,
                remaining,
            })
            .await?;
        Ok(remaining)
    }

    fn configure_pipeline(pipeline: &mut PipelineBuilder<ReserveStock>) -> DispatchResult<()> {
        pipeline.use_middleware(LoggingMiddleware::new());
        Ok(())
    }
}

struct StockLevelHandler;

#[async_trait]
impl Handler<StockLevel> for StockLevelHandler {
    async fn handle(&self, ctx: &HandlerContext, q: StockLevel) -> DispatchResult<u32> {
        let repo = repository(ctx)?;
        let levels = repo
            .levels
            .lock()
            .map_err(|_| DispatchError::invalid_argument("stock repository lock poisoned"))?;
        levels
            .get(&q.sku)
            .copied()
            .ok_or_else(|| DispatchError::handler(InventoryError::UnknownSku(q.sku)))
    }
}

const CONFIG: &str = r#"{
    "broadcast": { "strategy": "sequential", "failure_policy": "throw_after_all" }
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,herald_bus=debug".into()),
        )
        .init();

    let scope = SimpleScope::builder()
        .singleton(StockRepository::seeded(&[("apple", 10), ("pear", 2)]))
        .build();
    let dispatcher = Dispatcher::builder()
        .root_scope(scope)
        .config(DispatcherConfig::from_json(CONFIG)?)
        .build();

    let registry = dispatcher.registry();
    registry.register(ReserveStockHandler {
        dispatcher: dispatcher.clone(),
    })?;
    registry.register(StockLevelHandler)?;
    registry.register_fn(|ctx: HandlerContext, s: StockReserved| async move {
        tracing::info!(
            sku = %s.sku,
            remaining = s.remaining,
            trace_id = ctx.context().trace_id(),
            "stock reserved"
        );
        Ok(())
    })?;
    registry.register_fn(|_ctx: HandlerContext, s: StockReserved| async move {
        if s.remaining < 3 {
            tracing::warn!(sku = %s.sku, remaining = s.remaining, "low stock");
        }
        Ok(())
    })?;

    for entry in registry.registered() {
        println!(
            "registered {} {}: {}",
            entry.kind,
            entry.message,
            entry.handlers.join(", ")
        );
    }

    let root = AmbientContext::new_root();
    root.set_downstream("tenant", "north-store");

    let remaining = dispatcher
        .request::<ReserveStock>()
        .with_context(root.clone())
        .with_pipeline(|p| {
            p.use_middleware(RetryMiddleware::new(2));
            Ok(())
        })
        .execute(ReserveStock {
            sku: "apple".into(),
            quantity: 8,
        })
        .await?;
    println!(
        "apple remaining: {remaining} (reserved {:?}, trace {})",
        root.upstream("reserved"),
        root.trace_id()
    );

    match dispatcher
        .execute(ReserveStock {
            sku: "pear".into(),
            quantity: 5,
        })
        .await
    {
        Err(DispatchError::Handler(err)) => match err.downcast_ref::<InventoryError>() {
            Some(InventoryError::InsufficientStock { available, .. }) => {
                println!("pear reservation rejected, {available} available")
            }
            _ => return Err(err),
        },
        other => println!("unexpected pear result: {other:?}"),
    }

    let level = dispatcher
        .execute(StockLevel {
            sku: "apple".into(),
        })
        .await?;
    println!("apple level: {level}");

    Ok(())
}
