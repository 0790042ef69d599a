use super::strategy::{BroadcastContext, BroadcastingStrategy, HandlerInvoker};
use crate::error::{DispatchError, DispatchResult};
use async_trait::async_trait;
use serde::Deserialize;

/// 顺序广播的失败策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 第一个失败立即返回，后续处理器不再执行
    #[default]
    ThrowOnFirst,
    /// 全部执行完后返回：一个失败原样返回，多个聚合
    ThrowAfterAll,
}

/// 按注册顺序逐个执行
#[derive(Clone, Debug, Default)]
pub struct SequentialBroadcast {
    policy: FailurePolicy,
}

impl SequentialBroadcast {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

#[async_trait]
impl BroadcastingStrategy for SequentialBroadcast {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn broadcast(
        &self,
        invokers: Vec<HandlerInvoker>,
        ctx: BroadcastContext,
    ) -> DispatchResult<()> {
        let mut errors = Vec::new();

        for invoker in invokers {
            let Err(err) = invoker
                .invoke(ctx.scope(), ctx.cancellation().clone())
                .await
            else {
                continue;
            };

            tracing::warn!(
                signal = ctx.signal_name(),
                handler = invoker.handler_name(),
                trace_id = ctx.context().trace_id(),
                error = %err,
                "signal handler failed"
            );

            match self.policy {
                FailurePolicy::ThrowOnFirst => return Err(err),
                FailurePolicy::ThrowAfterAll => errors.push(err),
            }
        }

        DispatchError::combine(errors)
    }
}
