//! 中间件协议
//!
//! 中间件是一个带有自身可变配置的值。构建管道时可以按类型移除或配置中间件；
//! “按类型匹配”的规则：具体类型即为 `T`，或者通过 `upcast`/`upcast_mut`
//! 声明自身内嵌了一个 `T`（以组合表达“子类”关系）。
//!
use super::chain::PipelineChain;
use super::transport_type::TransportType;
use crate::context::AmbientContext;
use crate::error::DispatchResult;
use crate::message::Message;
use crate::scope::ScopeRef;
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 类型擦除辅助，对所有 `'static` 类型自动实现
pub trait MiddlewareAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> MiddlewareAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
pub trait Middleware<M: Message>: MiddlewareAny {
    async fn execute(&self, ctx: MiddlewareContext<M>) -> DispatchResult<M::Response>;

    /// 诊断用名称
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 以类型 `ty` 的身份暴露自身（或内嵌的中间件）
    fn upcast(&self, ty: TypeId) -> Option<&dyn Any> {
        let any = self.as_any();
        ((*any).type_id() == ty).then_some(any)
    }

    fn upcast_mut(&mut self, ty: TypeId) -> Option<&mut dyn Any> {
        let any = self.as_any_mut();
        if (*any).type_id() == ty {
            Some(any)
        } else {
            None
        }
    }
}

/// 覆盖 `upcast` 时回落到自身类型的匹配
pub fn upcast_self<T: Any>(this: &T, ty: TypeId) -> Option<&dyn Any> {
    (TypeId::of::<T>() == ty).then_some(this as &dyn Any)
}

pub fn upcast_self_mut<T: Any>(this: &mut T, ty: TypeId) -> Option<&mut dyn Any> {
    if TypeId::of::<T>() == ty {
        Some(this as &mut dyn Any)
    } else {
        None
    }
}

pub(crate) fn matches<M: Message, T: Any>(middleware: &dyn Middleware<M>) -> bool {
    middleware.upcast(TypeId::of::<T>()).is_some()
}

pub(crate) fn view_mut<M: Message, T: Any>(middleware: &mut dyn Middleware<M>) -> Option<&mut T> {
    middleware
        .upcast_mut(TypeId::of::<T>())?
        .downcast_mut::<T>()
}

/// 中间件执行参数
pub struct MiddlewareContext<M: Message> {
    pub message: M,
    pub cancellation: CancellationToken,
    pub context: AmbientContext,
    pub transport: TransportType,
    /// 当前分发所在的依赖解析作用域
    pub scope: ScopeRef,
    pub next: Next<M>,
}

impl<M: Message> MiddlewareContext<M> {
    /// 以原消息与原取消令牌调用下一环
    pub async fn proceed(self) -> DispatchResult<M::Response> {
        self.next.run(self.message, self.cancellation).await
    }
}

/// 调用链中的下一环；可调用零次、一次或多次
pub struct Next<M: Message> {
    pub(crate) chain: Arc<PipelineChain<M>>,
    pub(crate) index: usize,
}

impl<M: Message> Clone for Next<M> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            index: self.index,
        }
    }
}

impl<M: Message> Next<M> {
    pub async fn run(
        &self,
        message: M,
        cancellation: CancellationToken,
    ) -> DispatchResult<M::Response> {
        self.chain.invoke(self.index, message, cancellation).await
    }

    /// 之后还有多少个中间件（不含处理器）
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}
