//! 重试中间件：失败时以同一消息重新调用后续链路
//!
//! 配置错误与取消不重试；取消令牌在等待间隔期间触发时立即返回最后一次的错误。
//!
use async_trait::async_trait;
use herald_core::error::{DispatchError, DispatchResult};
use herald_core::message::Message;
use herald_core::pipeline::{Middleware, MiddlewareContext};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryMiddleware {
    /// 总尝试次数（含第一次），至少为 1
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

impl RetryMiddleware {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn retryable(err: &DispatchError) -> bool {
        !err.is_configuration() && !err.is_cancelled()
    }
}

#[async_trait]
impl<M: Message> Middleware<M> for RetryMiddleware {
    async fn execute(&self, ctx: MiddlewareContext<M>) -> DispatchResult<M::Response> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match ctx
                .next
                .run(ctx.message.clone(), ctx.cancellation.clone())
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if attempt >= max_attempts || !Self::retryable(&err) || ctx.cancellation.is_cancelled()
            {
                return Err(err);
            }

            tracing::warn!(
                message_name = M::NAME,
                trace_id = ctx.context.trace_id(),
                attempt,
                max_attempts,
                error = %err,
                "retrying message"
            );
            attempt += 1;

            if !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = ctx.cancellation.cancelled() => return Err(err),
                }
            }
        }
    }
}
