use super::strategy::{BroadcastContext, BroadcastingStrategy, HandlerInvoker};
use crate::error::{DispatchError, DispatchResult};
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt, stream};

/// 并发执行全部处理器，可限制最大并发数
///
/// 所有已启动的处理器都会被等待；失败按完成顺序聚合。
///
/// 处理器 future 在发布方任务内交替轮询，不会分派到其他工作线程：并发只发生在
/// 等待点上，CPU 密集的处理器会拖住同批的其他处理器，这类工作应由处理器自行
/// 交给 `spawn_blocking`。相应地，task-local 上下文在处理器中依然可见。
#[derive(Clone, Debug, Default)]
pub struct ParallelBroadcast {
    max_degree_of_parallelism: Option<isize>,
}

impl ParallelBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// 小于等于 0 的值在广播时以 `InvalidArgument` 拒绝
    pub fn with_max_degree_of_parallelism(max: isize) -> Self {
        Self {
            max_degree_of_parallelism: Some(max),
        }
    }

    pub fn max_degree_of_parallelism(&self) -> Option<isize> {
        self.max_degree_of_parallelism
    }
}

#[async_trait]
impl BroadcastingStrategy for ParallelBroadcast {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn broadcast(
        &self,
        invokers: Vec<HandlerInvoker>,
        ctx: BroadcastContext,
    ) -> DispatchResult<()> {
        let limit = match self.max_degree_of_parallelism {
            Some(max) if max <= 0 => {
                return Err(DispatchError::invalid_argument(format!(
                    "max degree of parallelism must be positive: {max}"
                )));
            }
            Some(max) => max.unsigned_abs(),
            None => invokers.len().max(1),
        };

        let scope = ctx.scope().clone();
        let cancellation = ctx.cancellation().clone();
        let signal = ctx.signal_name();
        let trace_id = ctx.context().trace_id().to_string();

        let pending: Vec<_> = invokers
            .into_iter()
            .map(move |invoker: HandlerInvoker| {
                let scope = scope.clone();
                let cancellation = cancellation.clone();
                let trace_id = trace_id.clone();
                async move {
                    let result = invoker.invoke(&scope, cancellation).await;
                    if let Err(err) = &result {
                        tracing::warn!(
                            signal,
                            handler = invoker.handler_name(),
                            trace_id = %trace_id,
                            error = %err,
                            "signal handler failed"
                        );
                    }
                    result.err()
                }
                .boxed()
            })
            .collect();

        let errors: Vec<DispatchError> = stream::iter(pending)
            .buffer_unordered(limit)
            .filter_map(|error| async move { error })
            .collect()
            .await;

        DispatchError::combine(errors)
    }
}
