//! 广播策略测试用的处理器探针
use super::strategy::{BroadcastContext, HandlerInvoker, InvokeHandler};
use crate::context::AmbientContext;
use crate::error::{DispatchError, DispatchResult};
use crate::scope::{ScopeRef, SimpleScope};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("probe failure {0}")]
pub(crate) struct ProbeFailure(pub(crate) u8);

#[derive(Clone, Copy)]
enum Behavior {
    Ok,
    Fail(u8),
    Checking,
    Slow(Duration),
    FailAfter(u8, Duration),
}

#[derive(Default)]
struct ProbeState {
    ran: Mutex<Vec<&'static str>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct Probe {
    state: Arc<ProbeState>,
}

impl Probe {
    fn invoker(&self, name: &'static str, behavior: Behavior) -> HandlerInvoker {
        Arc::new(ProbeInvoker {
            name,
            behavior,
            probe: self.clone(),
        })
    }

    pub(crate) fn ok(&self, name: &'static str) -> HandlerInvoker {
        self.invoker(name, Behavior::Ok)
    }

    pub(crate) fn fail(&self, name: &'static str, code: u8) -> HandlerInvoker {
        self.invoker(name, Behavior::Fail(code))
    }

    pub(crate) fn checking(&self, name: &'static str) -> HandlerInvoker {
        self.invoker(name, Behavior::Checking)
    }

    pub(crate) fn slow(&self, name: &'static str, delay: Duration) -> HandlerInvoker {
        self.invoker(name, Behavior::Slow(delay))
    }

    pub(crate) fn fail_after(&self, name: &'static str, code: u8, delay: Duration) -> HandlerInvoker {
        self.invoker(name, Behavior::FailAfter(code, delay))
    }

    /// 已完成的处理器（完成顺序）
    pub(crate) fn ran(&self) -> Vec<&'static str> {
        self.state.ran.lock().unwrap().clone()
    }

    pub(crate) fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn error_code(&self, err: &DispatchError) -> Option<u8> {
        match err {
            DispatchError::Handler(e) => e.downcast_ref::<ProbeFailure>().map(|f| f.0),
            _ => None,
        }
    }
}

struct ProbeInvoker {
    name: &'static str,
    behavior: Behavior,
    probe: Probe,
}

#[async_trait]
impl InvokeHandler for ProbeInvoker {
    fn handler_name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, _scope: &ScopeRef, cancellation: CancellationToken) -> DispatchResult<()> {
        let state = &self.probe.state;
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(now, Ordering::SeqCst);

        let result = match self.behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail(code) => Err(DispatchError::handler(ProbeFailure(code))),
            Behavior::Checking if cancellation.is_cancelled() => Err(DispatchError::Cancelled),
            Behavior::Checking => Ok(()),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Behavior::FailAfter(code, delay) => {
                tokio::time::sleep(delay).await;
                Err(DispatchError::handler(ProbeFailure(code)))
            }
        };

        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        state.ran.lock().unwrap().push(self.name);
        result
    }
}

pub(crate) fn ctx_with(cancellation: CancellationToken) -> BroadcastContext {
    let signal: Arc<dyn Any + Send + Sync> = Arc::new(());
    BroadcastContext::builder()
        .scope(SimpleScope::empty())
        .signal(signal)
        .signal_name("probe")
        .transport_name("in-process")
        .cancellation(cancellation)
        .context(AmbientContext::new_root())
        .build()
}
