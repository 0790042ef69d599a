use super::middleware::{Middleware, matches, view_mut};
use super::transport_type::TransportType;
use crate::error::{DispatchError, DispatchResult};
use crate::message::Message;
use crate::scope::ScopeRef;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// 管道配置函数（处理器声明的或调用方传入的）
pub type PipelineConfigurator<M> =
    Arc<dyn Fn(&mut PipelineBuilder<M>) -> DispatchResult<()> + Send + Sync>;

/// 可变的管道构建器（Empty/Building 阶段）
pub struct PipelineBuilder<M: Message> {
    scope: ScopeRef,
    transport: TransportType,
    entries: Vec<Box<dyn Middleware<M>>>,
}

impl<M: Message> PipelineBuilder<M> {
    pub fn new(scope: ScopeRef, transport: TransportType) -> Self {
        Self {
            scope,
            transport,
            entries: Vec::new(),
        }
    }

    /// 追加中间件
    pub fn use_middleware(&mut self, middleware: impl Middleware<M>) -> &mut Self {
        self.entries.push(Box::new(middleware));
        self
    }

    pub fn use_boxed(&mut self, middleware: Box<dyn Middleware<M>>) -> &mut Self {
        self.entries.push(middleware);
        self
    }

    /// 移除所有匹配 `T` 的中间件
    pub fn without<T: Any>(&mut self) -> &mut Self {
        self.entries.retain(|entry| !matches::<M, T>(&**entry));
        self
    }

    /// 配置所有匹配 `T` 的中间件；一个都没有时返回 `MiddlewareNotFound`
    pub fn configure<T, F>(&mut self, mut configure: F) -> DispatchResult<&mut Self>
    where
        T: Any,
        F: FnMut(&mut T),
    {
        let mut found = false;
        for entry in self.entries.iter_mut() {
            if let Some(middleware) = view_mut::<M, T>(&mut **entry) {
                configure(middleware);
                found = true;
            }
        }

        if !found {
            return Err(DispatchError::MiddlewareNotFound(type_name::<T>()));
        }
        Ok(self)
    }

    /// 执行一个配置函数
    pub fn apply(&mut self, configurator: &PipelineConfigurator<M>) -> DispatchResult<&mut Self> {
        configurator(self)?;
        Ok(self)
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.entries.iter().any(|entry| matches::<M, T>(&**entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已注册中间件的名称（按顺序）
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name()).collect()
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    pub fn transport(&self) -> &TransportType {
        &self.transport
    }

    pub fn build(self) -> Pipeline<M> {
        Pipeline {
            scope: self.scope,
            transport: self.transport,
            middlewares: self.entries.into_iter().map(Arc::from).collect(),
        }
    }
}

/// 构建完成的不可变管道（Built 阶段）
pub struct Pipeline<M: Message> {
    pub(crate) scope: ScopeRef,
    pub(crate) transport: TransportType,
    pub(crate) middlewares: Vec<Arc<dyn Middleware<M>>>,
}

impl<M: Message> Clone for Pipeline<M> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            transport: self.transport.clone(),
            middlewares: self.middlewares.clone(),
        }
    }
}

impl<M: Message> Pipeline<M> {
    pub fn empty(scope: ScopeRef, transport: TransportType) -> Self {
        PipelineBuilder::new(scope, transport).build()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn transport(&self) -> &TransportType {
        &self.transport
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}

impl<M: Message> fmt::Debug for Pipeline<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("message", &M::NAME)
            .field("transport", &self.transport)
            .field("middlewares", &self.middleware_names())
            .finish()
    }
}
