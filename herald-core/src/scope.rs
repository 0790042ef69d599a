//! 依赖解析作用域（ServiceScope）协议
//!
//! 分发核心只依赖两个能力：按类型解析实例、创建子作用域。具体的生命周期语义
//! 由实现方决定，核心只假设“同一作用域内重复解析 scoped/singleton 注册得到同一实例”。
//!
//! `SimpleScope` 是一个最小的内存实现，供默认根作用域与测试使用。
//!
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// 类型擦除后的服务实例
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// 作用域引用；分发期间以同一个 `ScopeRef` 贯穿管道构建与中间件执行
pub type ScopeRef = Arc<dyn ServiceScope>;

/// 依赖解析作用域
pub trait ServiceScope: Send + Sync + 'static {
    /// 按类型解析实例；未注册返回 `None`
    fn resolve_any(&self, ty: TypeId) -> Option<ServiceInstance>;

    /// 创建子作用域
    fn create_child_scope(&self) -> ScopeRef;
}

impl dyn ServiceScope {
    /// 强类型解析
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve_any(TypeId::of::<T>())?.downcast::<T>().ok()
    }
}

/// 判断两个作用域引用是否指向同一实例
pub fn same_scope(a: &ScopeRef, b: &ScopeRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 服务生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// 根及所有子作用域共享一个实例
    Singleton,
    /// 每个作用域一个实例
    Scoped,
    /// 每次解析创建新实例
    Transient,
}

type Factory = Arc<dyn Fn(&dyn ServiceScope) -> ServiceInstance + Send + Sync>;

#[derive(Clone)]
struct Registration {
    lifetime: Lifetime,
    factory: Factory,
    type_name: &'static str,
}

/// `SimpleScope` 构建器
#[derive(Default)]
pub struct SimpleScopeBuilder {
    registrations: HashMap<TypeId, Registration>,
}

impl SimpleScopeBuilder {
    /// 注册一个已构造好的单例
    pub fn singleton<T: Any + Send + Sync>(self, value: T) -> Self {
        let instance: ServiceInstance = Arc::new(value);
        self.add::<T>(Lifetime::Singleton, Arc::new(move |_| instance.clone()))
    }

    pub fn singleton_with<T, F>(self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceScope) -> T + Send + Sync + 'static,
    {
        self.add::<T>(Lifetime::Singleton, erase(factory))
    }

    pub fn scoped<T, F>(self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceScope) -> T + Send + Sync + 'static,
    {
        self.add::<T>(Lifetime::Scoped, erase(factory))
    }

    pub fn transient<T, F>(self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceScope) -> T + Send + Sync + 'static,
    {
        self.add::<T>(Lifetime::Transient, erase(factory))
    }

    fn add<T: Any>(mut self, lifetime: Lifetime, factory: Factory) -> Self {
        self.registrations.insert(
            TypeId::of::<T>(),
            Registration {
                lifetime,
                factory,
                type_name: type_name::<T>(),
            },
        );
        self
    }

    /// 构建根作用域
    pub fn build(self) -> ScopeRef {
        Arc::new(SimpleScope {
            registrations: Arc::new(self.registrations),
            singletons: Arc::new(DashMap::new()),
            scoped: DashMap::new(),
        })
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    F: Fn(&dyn ServiceScope) -> T + Send + Sync + 'static,
{
    Arc::new(move |scope| Arc::new(factory(scope)) as ServiceInstance)
}

/// 最小的内存作用域实现
pub struct SimpleScope {
    registrations: Arc<HashMap<TypeId, Registration>>,
    singletons: Arc<DashMap<TypeId, ServiceInstance>>,
    scoped: DashMap<TypeId, ServiceInstance>,
}

impl SimpleScope {
    pub fn builder() -> SimpleScopeBuilder {
        SimpleScopeBuilder::default()
    }

    /// 空作用域：不解析任何服务
    pub fn empty() -> ScopeRef {
        SimpleScopeBuilder::default().build()
    }

    /// 已注册的服务类型名（只读视图）
    pub fn registered_services(&self) -> Vec<&'static str> {
        self.registrations.values().map(|r| r.type_name).collect()
    }

    // 工厂可能递归解析其他服务，调用工厂期间不能持有 map 的锁
    fn cached(
        &self,
        cache: &DashMap<TypeId, ServiceInstance>,
        ty: TypeId,
        factory: &Factory,
    ) -> ServiceInstance {
        if let Some(existing) = cache.get(&ty) {
            return existing.clone();
        }
        let created = factory(self);
        cache.entry(ty).or_insert(created).clone()
    }
}

impl ServiceScope for SimpleScope {
    fn resolve_any(&self, ty: TypeId) -> Option<ServiceInstance> {
        let registration = self.registrations.get(&ty)?;

        let instance = match registration.lifetime {
            Lifetime::Singleton => self.cached(&self.singletons, ty, &registration.factory),
            Lifetime::Scoped => self.cached(&self.scoped, ty, &registration.factory),
            Lifetime::Transient => (registration.factory)(self),
        };

        Some(instance)
    }

    fn create_child_scope(&self) -> ScopeRef {
        Arc::new(SimpleScope {
            registrations: self.registrations.clone(),
            singletons: self.singletons.clone(),
            scoped: DashMap::new(),
        })
    }
}
