//! 处理器注册表
//!
//! 以消息的 `TypeId` 为键保存处理器描述：
//! - 请求（命令/查询）：同一消息只保留一个处理器，重复注册替换旧值；
//! - 信号：按注册顺序追加；
//! - 同一消息出现不同的响应类型或不同的消息种类时拒绝注册。
//!
//! 描述内部以类型擦除方式保存 `TypedRegistration<M>`，分发时按消息类型还原。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{FnHandler, Handler, HandlerContext};
use crate::message::{Message, MessageKind};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfigurator, TransportType};
use crate::scope::ScopeRef;
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 每次分发时取得处理器实例的方式
pub type HandlerResolver<M> =
    Arc<dyn Fn(&ScopeRef) -> DispatchResult<Arc<dyn Handler<M>>> + Send + Sync>;

/// 处理器来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerSource {
    /// 从分发作用域解析处理器类型
    Scoped,
    Factory,
    Instance,
    /// 内联函数
    Inline,
}

/// 强类型的注册项
pub struct TypedRegistration<M: Message> {
    handler_name: &'static str,
    source: HandlerSource,
    resolver: HandlerResolver<M>,
    configurator: Option<PipelineConfigurator<M>>,
}

impl<M: Message> TypedRegistration<M> {
    pub fn new(
        handler_name: &'static str,
        source: HandlerSource,
        resolver: HandlerResolver<M>,
        configurator: Option<PipelineConfigurator<M>>,
    ) -> Self {
        Self {
            handler_name,
            source,
            resolver,
            configurator,
        }
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn source(&self) -> HandlerSource {
        self.source
    }

    pub fn resolve(&self, scope: &ScopeRef) -> DispatchResult<Arc<dyn Handler<M>>> {
        (self.resolver)(scope)
    }

    /// 用处理器声明的配置构建处理方管道
    pub fn build_pipeline(
        &self,
        scope: &ScopeRef,
        transport: TransportType,
    ) -> DispatchResult<Pipeline<M>> {
        let mut builder = PipelineBuilder::new(scope.clone(), transport);
        if let Some(configurator) = &self.configurator {
            builder.apply(configurator)?;
        }
        Ok(builder.build())
    }
}

/// 类型擦除的处理器描述
#[derive(Clone)]
pub struct HandlerDescriptor {
    message: TypeId,
    message_name: &'static str,
    kind: MessageKind,
    response: TypeId,
    response_name: &'static str,
    handler_name: &'static str,
    registration: Arc<dyn Any + Send + Sync>,
}

impl HandlerDescriptor {
    pub fn new<M: Message>(registration: TypedRegistration<M>) -> Self {
        Self {
            message: TypeId::of::<M>(),
            message_name: M::NAME,
            kind: M::KIND,
            response: TypeId::of::<M::Response>(),
            response_name: type_name::<M::Response>(),
            handler_name: registration.handler_name,
            registration: Arc::new(registration),
        }
    }

    pub fn message_type(&self) -> TypeId {
        self.message
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn response_name(&self) -> &'static str {
        self.response_name
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// 还原为强类型注册项
    pub fn typed<M: Message>(&self) -> DispatchResult<Arc<TypedRegistration<M>>> {
        self.registration
            .clone()
            .downcast::<TypedRegistration<M>>()
            .map_err(|_| DispatchError::TypeMismatch {
                expected: M::NAME,
                found: self.message_name,
            })
    }

    #[cfg(test)]
    pub(crate) fn with_response<R: 'static>(mut self) -> Self {
        self.response = TypeId::of::<R>();
        self.response_name = type_name::<R>();
        self
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("message", &self.message_name)
            .field("kind", &self.kind)
            .field("response", &self.response_name)
            .field("handler", &self.handler_name)
            .finish()
    }
}

/// 诊断信息：某个消息及其处理器
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredMessage {
    pub message: &'static str,
    pub kind: MessageKind,
    pub handlers: Vec<&'static str>,
}

/// 处理器注册表；克隆共享同一份数据
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<TypeId, Vec<HandlerDescriptor>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, descriptor: HandlerDescriptor) -> DispatchResult<()> {
        let mut entry = self.handlers.entry(descriptor.message).or_default();

        if let Some(existing) = entry.first() {
            if existing.kind != descriptor.kind {
                return Err(DispatchError::ConflictingRegistration {
                    message: descriptor.message_name,
                    registered: existing.kind.as_str(),
                    rejected: descriptor.kind.as_str(),
                });
            }
            if existing.response != descriptor.response {
                return Err(DispatchError::ConflictingRegistration {
                    message: descriptor.message_name,
                    registered: existing.response_name,
                    rejected: descriptor.response_name,
                });
            }
        }

        tracing::debug!(
            message_name = descriptor.message_name,
            kind = %descriptor.kind,
            handler = descriptor.handler_name,
            "handler registered"
        );

        if descriptor.kind.is_request() {
            entry.clear();
        }
        entry.push(descriptor);
        Ok(())
    }

    /// 注册处理器实例
    pub fn register<M, H>(&self, handler: H) -> DispatchResult<()>
    where
        M: Message,
        H: Handler<M>,
    {
        self.register_arc::<M, H>(Arc::new(handler))
    }

    pub fn register_arc<M, H>(&self, handler: Arc<H>) -> DispatchResult<()>
    where
        M: Message,
        H: Handler<M>,
    {
        let resolver: HandlerResolver<M> =
            Arc::new(move |_| Ok(handler.clone() as Arc<dyn Handler<M>>));
        self.add_typed::<M, H>(HandlerSource::Instance, resolver)
    }

    /// 每次分发调用工厂创建处理器
    pub fn register_factory<M, H, F>(&self, factory: F) -> DispatchResult<()>
    where
        M: Message,
        H: Handler<M>,
        F: Fn(&ScopeRef) -> H + Send + Sync + 'static,
    {
        let resolver: HandlerResolver<M> =
            Arc::new(move |scope| Ok(Arc::new(factory(scope)) as Arc<dyn Handler<M>>));
        self.add_typed::<M, H>(HandlerSource::Factory, resolver)
    }

    /// 每次分发从作用域解析处理器类型 `H`
    pub fn register_scoped<M, H>(&self) -> DispatchResult<()>
    where
        M: Message,
        H: Handler<M>,
    {
        let resolver: HandlerResolver<M> = Arc::new(|scope| {
            scope
                .resolve::<H>()
                .map(|handler| handler as Arc<dyn Handler<M>>)
                .ok_or(DispatchError::HandlerUnresolvable(type_name::<H>()))
        });
        self.add_typed::<M, H>(HandlerSource::Scoped, resolver)
    }

    /// 注册内联函数
    pub fn register_fn<M, F, Fut>(&self, f: F) -> DispatchResult<()>
    where
        M: Message,
        F: Fn(HandlerContext, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<M::Response>> + Send + 'static,
    {
        self.add_fn(f, None)
    }

    /// 注册内联函数并声明处理方管道
    pub fn register_fn_with_pipeline<M, F, Fut, C>(&self, f: F, configure: C) -> DispatchResult<()>
    where
        M: Message,
        F: Fn(HandlerContext, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<M::Response>> + Send + 'static,
        C: Fn(&mut PipelineBuilder<M>) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.add_fn(f, Some(Arc::new(configure)))
    }

    fn add_fn<M, F, Fut>(
        &self,
        f: F,
        configurator: Option<PipelineConfigurator<M>>,
    ) -> DispatchResult<()>
    where
        M: Message,
        F: Fn(HandlerContext, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<M::Response>> + Send + 'static,
    {
        let handler: Arc<dyn Handler<M>> = Arc::new(FnHandler::new(f));
        let resolver: HandlerResolver<M> = Arc::new(move |_| Ok(handler.clone()));
        self.add(HandlerDescriptor::new(TypedRegistration::new(
            type_name::<F>(),
            HandlerSource::Inline,
            resolver,
            configurator,
        )))
    }

    fn add_typed<M, H>(&self, source: HandlerSource, resolver: HandlerResolver<M>) -> DispatchResult<()>
    where
        M: Message,
        H: Handler<M>,
    {
        let configurator: PipelineConfigurator<M> = Arc::new(<H as Handler<M>>::configure_pipeline);
        self.add(HandlerDescriptor::new(TypedRegistration::new(
            type_name::<H>(),
            source,
            resolver,
            Some(configurator),
        )))
    }

    /// 零个、一个或多个描述（注册顺序）
    pub fn resolve(&self, message: TypeId) -> Vec<HandlerDescriptor> {
        self.handlers
            .get(&message)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// 请求消息的唯一处理器
    pub fn resolve_request<M: Message>(&self) -> DispatchResult<Arc<TypedRegistration<M>>> {
        let descriptors = self.resolve(TypeId::of::<M>());
        match descriptors.as_slice() {
            [descriptor] => descriptor.typed::<M>(),
            _ => Err(DispatchError::HandlerNotFound(M::NAME)),
        }
    }

    /// 信号的全部处理器（注册顺序）
    pub fn resolve_all<M: Message>(&self) -> DispatchResult<Vec<Arc<TypedRegistration<M>>>> {
        self.resolve(TypeId::of::<M>())
            .iter()
            .map(HandlerDescriptor::typed::<M>)
            .collect()
    }

    pub fn contains<M: Message>(&self) -> bool {
        self.handlers
            .get(&TypeId::of::<M>())
            .is_some_and(|entry| !entry.is_empty())
    }

    /// 已注册的消息与处理器（按消息名排序）
    pub fn registered(&self) -> Vec<RegisteredMessage> {
        let mut out: Vec<RegisteredMessage> = self
            .handlers
            .iter()
            .filter_map(|entry| {
                let first = entry.value().first()?;
                Some(RegisteredMessage {
                    message: first.message_name,
                    kind: first.kind,
                    handlers: entry.value().iter().map(|d| d.handler_name).collect(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.message.cmp(b.message));
        out
    }
}
