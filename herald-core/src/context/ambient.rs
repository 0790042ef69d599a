//! 环境上下文（AmbientContext）
//!
//! 每个逻辑操作一个上下文；嵌套分发创建子上下文：
//! - trace id 与父上下文相同；
//! - operation id 重新生成；
//! - 下行数据与父上下文共享同一张表；
//! - 上行数据写入子上下文自己的表，子作用域结束时合并到父上下文。
//!
//! 上下文既显式地随 `MiddlewareContext`/`HandlerContext` 传递，也通过
//! task-local 提供 `AmbientContext::current()` 便捷访问。
//!
use super::codec::{self, DOWNSTREAM_TAG, UPSTREAM_TAG};
use super::data::{ContextData, DataScope};
use super::trace;
use crate::error::{DispatchError, DispatchResult};
use crate::transport::ContextHeaders;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

tokio::task_local! {
    static CURRENT: AmbientContext;
}

struct ContextInner {
    trace_id: OnceLock<String>,
    external_trace_id: Option<String>,
    operation_id: String,
    downstream: ContextData,
    upstream: ContextData,
    parent: Option<AmbientContext>,
    ended: AtomicBool,
}

/// 环境上下文句柄；克隆得到的是同一个上下文
#[derive(Clone)]
pub struct AmbientContext {
    inner: Arc<ContextInner>,
}

impl AmbientContext {
    /// 创建根上下文；若存在活动的外部链路 span，trace id 取自该 span
    pub fn new_root() -> Self {
        Self::root(trace::external_trace_id(), ContextData::new())
    }

    /// 以给定 trace id 创建根上下文
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        let context = Self::root(None, ContextData::new());
        let _ = context.inner.trace_id.set(trace_id.into());
        context
    }

    fn root(external_trace_id: Option<String>, downstream: ContextData) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                trace_id: OnceLock::new(),
                external_trace_id,
                operation_id: trace::random_operation_id(),
                downstream,
                upstream: ContextData::new(),
                parent: None,
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// 为嵌套分发创建子上下文
    pub fn child(&self) -> Self {
        let trace_id = OnceLock::new();
        let _ = trace_id.set(self.trace_id().to_string());

        Self {
            inner: Arc::new(ContextInner {
                trace_id,
                external_trace_id: None,
                operation_id: trace::random_operation_id(),
                downstream: self.inner.downstream.clone(),
                upstream: ContextData::new(),
                parent: Some(self.clone()),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// 第一次读取时确定，之后不再变化
    pub fn trace_id(&self) -> &str {
        self.inner.trace_id.get_or_init(|| {
            self.inner
                .external_trace_id
                .clone()
                .unwrap_or_else(trace::random_trace_id)
        })
    }

    /// 仅在 trace id 尚未被读取或设置时有效
    pub fn set_trace_id(&self, trace_id: impl Into<String>) -> DispatchResult<()> {
        let trace_id = trace_id.into();
        if trace_id.is_empty() {
            return Err(DispatchError::invalid_argument("trace id must not be empty"));
        }
        self.inner.trace_id.set(trace_id).map_err(|rejected| {
            DispatchError::invalid_argument(format!(
                "trace id already assigned: current={}, rejected={rejected}",
                self.trace_id()
            ))
        })
    }

    pub fn operation_id(&self) -> &str {
        &self.inner.operation_id
    }

    pub fn parent(&self) -> Option<&AmbientContext> {
        self.inner.parent.as_ref()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &AmbientContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn set_downstream(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.downstream.set(key, value);
    }

    pub fn set_downstream_scoped(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        scope: DataScope,
    ) {
        self.inner.downstream.set_scoped(key, value, scope);
    }

    pub fn downstream(&self, key: &str) -> Option<Value> {
        self.inner.downstream.get(key)
    }

    pub fn downstream_data(&self) -> &ContextData {
        &self.inner.downstream
    }

    pub fn set_upstream(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.upstream.set(key, value);
    }

    pub fn set_upstream_scoped(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        scope: DataScope,
    ) {
        self.inner.upstream.set_scoped(key, value, scope);
    }

    pub fn upstream(&self, key: &str) -> Option<Value> {
        self.inner.upstream.get(key)
    }

    pub fn upstream_data(&self) -> &ContextData {
        &self.inner.upstream
    }

    /// 结束上下文；只有第一次调用生效，上行数据合并到父上下文
    pub(crate) fn finish(&self) {
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(parent) = &self.inner.parent {
            parent.inner.upstream.merge_from(&self.inner.upstream);
        }
    }

    /// 当前任务链上的上下文；已结束的上下文不会返回
    pub fn current() -> Option<AmbientContext> {
        CURRENT
            .try_with(|context| context.clone())
            .ok()
            .filter(|context| !context.is_ended())
    }

    /// 复用当前上下文，或创建新的根上下文（此时调用方为所有者）
    pub fn get_or_create() -> ContextScope {
        match Self::current() {
            Some(context) => ContextScope::borrowed(context),
            None => ContextScope::owned(Self::new_root()),
        }
    }

    /// 为一次分发开启上下文：有父上下文（显式或当前）时创建子上下文，否则创建根
    pub fn begin_operation(parent: Option<&AmbientContext>) -> ContextScope {
        let parent = parent.cloned().or_else(Self::current);
        let context = match parent {
            Some(parent) => parent.child(),
            None => Self::new_root(),
        };
        ContextScope::owned(context)
    }

    /// 发往远端的上下文头：trace id 与可传输的下行数据
    pub fn outgoing_headers(&self) -> ContextHeaders {
        ContextHeaders {
            trace_id: Some(self.trace_id().to_string()),
            data: codec::encode(&[(DOWNSTREAM_TAG, &self.inner.downstream)]),
        }
    }

    /// 返回给调用方的上下文头：trace id 与可传输的上行数据
    pub fn upstream_headers(&self) -> ContextHeaders {
        ContextHeaders {
            trace_id: Some(self.trace_id().to_string()),
            data: codec::encode(&[(UPSTREAM_TAG, &self.inner.upstream)]),
        }
    }

    /// 合并远端返回的上行数据；下行段被忽略
    pub fn accept_upstream(&self, headers: &ContextHeaders) -> DispatchResult<()> {
        let Some(data) = headers.data.as_deref() else {
            return Ok(());
        };
        for (tag, key, value) in codec::decode(data)? {
            if tag == UPSTREAM_TAG {
                self.inner.upstream.set(key, value);
            }
        }
        Ok(())
    }

    /// 由远端传入的上下文头重建根上下文
    pub fn from_headers(headers: &ContextHeaders) -> DispatchResult<AmbientContext> {
        let context = match headers.trace_id.as_deref() {
            Some(trace_id) if !trace_id.is_empty() => Self::with_trace_id(trace_id),
            _ => Self::new_root(),
        };

        if let Some(data) = headers.data.as_deref() {
            for (tag, key, value) in codec::decode(data)? {
                match tag {
                    DOWNSTREAM_TAG => context.inner.downstream.set(key, value),
                    _ => context.inner.upstream.set(key, value),
                }
            }
        }

        Ok(context)
    }
}

impl fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientContext")
            .field("trace_id", &self.inner.trace_id.get())
            .field("operation_id", &self.inner.operation_id)
            .field("downstream", &self.inner.downstream.len())
            .field("upstream", &self.inner.upstream.len())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// 上下文作用域
///
/// 所有者在作用域被丢弃时结束上下文（正常返回、出错、取消导致的 future 丢弃
/// 均如此），且只结束一次。
#[must_use]
pub struct ContextScope {
    context: AmbientContext,
    owner: bool,
}

impl ContextScope {
    /// 接管一个已创建的上下文（例如由传输头重建的根上下文），调用方成为所有者
    pub fn adopt(context: AmbientContext) -> Self {
        Self::owned(context)
    }

    fn owned(context: AmbientContext) -> Self {
        Self {
            context,
            owner: true,
        }
    }

    fn borrowed(context: AmbientContext) -> Self {
        Self {
            context,
            owner: false,
        }
    }

    pub fn context(&self) -> &AmbientContext {
        &self.context
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// 在该上下文中运行 future，结束后按所有权关闭作用域
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self.context.clone(), fut).await
    }

    /// 同步版本
    pub fn enter_sync<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self.context.clone(), f)
    }

    pub fn end(self) {}
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if self.owner {
            self.context.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_shares_trace_and_downstream() {
        let root = AmbientContext::new_root();
        root.set_downstream("tenant", "acme");

        let child = root.child();
        assert_eq!(child.trace_id(), root.trace_id());
        assert_ne!(child.operation_id(), root.operation_id());
        assert_eq!(child.downstream("tenant"), Some(json!("acme")));

        child.set_downstream("late", 1);
        assert_eq!(root.downstream("late"), Some(json!(1)));
        assert!(child.parent().unwrap().ptr_eq(&root));
    }

    #[test]
    fn upstream_is_merged_when_child_ends() {
        let root = AmbientContext::new_root();
        let scope = AmbientContext::begin_operation(Some(&root));
        scope.context().set_upstream("rows", 3);

        assert_eq!(root.upstream("rows"), None);
        scope.end();
        assert_eq!(root.upstream("rows"), Some(json!(3)));
    }

    #[test]
    fn trace_id_is_assigned_once() {
        let context = AmbientContext::new_root();
        context.set_trace_id("abc").unwrap();
        assert_eq!(context.trace_id(), "abc");
        assert!(matches!(
            context.set_trace_id("def"),
            Err(DispatchError::InvalidArgument { .. })
        ));

        let read_first = AmbientContext::new_root();
        let generated = read_first.trace_id().to_string();
        assert!(read_first.set_trace_id("late").is_err());
        assert_eq!(read_first.trace_id(), generated);

        assert!(AmbientContext::new_root().set_trace_id("").is_err());
    }

    #[tokio::test]
    async fn get_or_create_reuses_current() {
        assert!(AmbientContext::current().is_none());

        let outer = AmbientContext::get_or_create();
        assert!(outer.is_owner());
        let expected = outer.context().clone();

        outer
            .run(async move {
                let inner = AmbientContext::get_or_create();
                assert!(!inner.is_owner());
                assert!(inner.context().ptr_eq(&expected));
                drop(inner);
                assert!(!expected.is_ended());
                assert!(AmbientContext::current().unwrap().ptr_eq(&expected));
            })
            .await;
    }

    #[tokio::test]
    async fn owner_ends_scope_exactly_once_even_on_drop() {
        let scope = AmbientContext::get_or_create();
        let context = scope.context().clone();

        let fut = scope.run(std::future::pending::<()>());
        drop(fut);

        assert!(context.is_ended());
        let ended = context.clone();
        let visible = AmbientContext::begin_operation(None);
        let current = visible.enter_sync(AmbientContext::current).unwrap();
        assert!(!current.ptr_eq(&ended));
    }

    #[test]
    fn ended_context_is_not_current() {
        let scope = AmbientContext::get_or_create();
        let context = scope.context().clone();
        context.finish();
        assert!(scope.enter_sync(AmbientContext::current).is_none());
    }

    #[test]
    fn headers_round_trip() {
        let caller = AmbientContext::with_trace_id("0af7651916cd43dd8448eb211c80319c");
        caller.set_downstream("user", json!({"id": 42, "role": "a|b"}));
        caller.set_downstream_scoped("local", 1, DataScope::InProcess);

        let headers = caller.outgoing_headers();
        let remote = AmbientContext::from_headers(&headers).unwrap();
        assert_eq!(remote.trace_id(), caller.trace_id());
        assert_eq!(remote.downstream("user"), caller.downstream("user"));
        assert_eq!(remote.downstream("local"), None);

        remote.set_upstream("remote:count", 9);
        caller.accept_upstream(&remote.upstream_headers()).unwrap();
        assert_eq!(caller.upstream("remote:count"), Some(json!(9)));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let headers = ContextHeaders {
            trace_id: None,
            data: Some("q|x".into()),
        };
        assert!(matches!(
            AmbientContext::from_headers(&headers),
            Err(DispatchError::InvalidContextData { .. })
        ));
    }
}
