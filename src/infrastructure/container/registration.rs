//! 注册信息与类型擦除

use super::context::{DependencyMap, InjectionContext};
use super::{short_type_name, ContainerError, DiContainer, Lifecycle};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 类型擦除后的实例，内部保存 `Arc<I>`，因此接口可以是 trait object
pub type ErasedInstance = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory = Arc<
    dyn Fn(&DiContainer, &InjectionContext<'_>) -> Result<ErasedInstance, ContainerError>
        + Send
        + Sync,
>;

/// 把接口实例转换成另一种视图，用于 `resolve_all`
pub(crate) type ErasedView = Arc<dyn Fn(&ErasedInstance) -> Option<ErasedInstance> + Send + Sync>;

pub(crate) fn erase<I: ?Sized + Send + Sync + 'static>(instance: Arc<I>) -> ErasedInstance {
    Arc::new(instance)
}

pub(crate) fn unerase<I: ?Sized + Send + Sync + 'static>(
    erased: &ErasedInstance,
) -> Result<Arc<I>, ContainerError> {
    erased
        .downcast_ref::<Arc<I>>()
        .cloned()
        .ok_or_else(|| ContainerError::TypeMismatch {
            expected: short_type_name::<I>(),
            found: "<erased>".to_string(),
        })
}

/// 一条依赖注册
///
/// 预构建实例与工厂互斥，预构建实例必须是单例。
pub struct DependencyRegistration {
    pub(crate) interface: TypeId,
    pub interface_name: String,
    pub implementation_name: String,
    pub lifecycle: Lifecycle,
    pub is_mock: bool,
    pub dependencies: DependencyMap,
    pub(crate) instance: Option<(TypeId, ErasedInstance)>,
    pub(crate) factory: Option<ErasedFactory>,
    pub(crate) cached: RwLock<Option<ErasedInstance>>,
    pub(crate) views: RwLock<HashMap<TypeId, ErasedView>>,
    pub(crate) sequence: u64,
}

impl DependencyRegistration {
    pub fn new<I: ?Sized + Send + Sync + 'static>(lifecycle: Lifecycle) -> Self {
        let name = short_type_name::<I>();
        Self {
            interface: TypeId::of::<I>(),
            interface_name: name.clone(),
            implementation_name: name,
            lifecycle,
            is_mock: false,
            dependencies: DependencyMap::new(),
            instance: None,
            factory: None,
            cached: RwLock::new(None),
            views: RwLock::new(HashMap::new()),
            sequence: 0,
        }
    }

    pub fn with_instance<I: ?Sized + Send + Sync + 'static>(mut self, instance: Arc<I>) -> Self {
        self.instance = Some((TypeId::of::<I>(), erase(instance)));
        self
    }

    /// 工厂接收容器本身，可以继续解析其他依赖
    pub fn with_factory<I, F>(mut self, factory: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&DiContainer) -> Result<Arc<I>, ContainerError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(
            move |container: &DiContainer, _ctx: &InjectionContext<'_>| {
                factory(container).map(erase)
            },
        ));
        self
    }

    pub fn with_implementation_name(mut self, name: impl Into<String>) -> Self {
        self.implementation_name = name.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencyMap) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn as_mock(mut self) -> Self {
        self.is_mock = true;
        self
    }

    pub(crate) fn with_erased_factory(mut self, factory: ErasedFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn validate(&self) -> Result<(), ContainerError> {
        let invalid = |reason: &str| ContainerError::InvalidRegistration {
            type_name: self.interface_name.clone(),
            reason: reason.to_string(),
        };

        match (&self.instance, &self.factory) {
            (Some(_), Some(_)) => Err(invalid("cannot provide both an instance and a factory")),
            (None, None) => Err(invalid("either an instance or a factory is required")),
            (Some((type_id, _)), None) => {
                if *type_id != self.interface {
                    Err(invalid("instance type does not match the registered interface"))
                } else if self.lifecycle != Lifecycle::Singleton {
                    Err(invalid("pre-built instances must use the singleton lifecycle"))
                } else {
                    Ok(())
                }
            }
            (None, Some(_)) => Ok(()),
        }
    }

    /// 已缓存或预构建的实例
    pub(crate) fn cached_instance(&self) -> Option<ErasedInstance> {
        if let Some((_, instance)) = &self.instance {
            return Some(instance.clone());
        }
        self.cached.read().clone()
    }

    /// 保存单例，并发构造时保留先写入的实例
    pub(crate) fn store_instance(&self, instance: ErasedInstance) -> ErasedInstance {
        let mut cached = self.cached.write();
        match cached.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *cached = Some(instance.clone());
                instance
            }
        }
    }

    pub(crate) fn clear_cached(&self) {
        self.cached.write().take();
    }

    pub(crate) fn has_live_instance(&self) -> bool {
        self.instance.is_some() || self.cached.read().is_some()
    }

    pub(crate) fn view(&self, target: TypeId) -> Option<ErasedView> {
        self.views.read().get(&target).cloned()
    }
}

impl std::fmt::Debug for DependencyRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyRegistration")
            .field("interface", &self.interface_name)
            .field("implementation", &self.implementation_name)
            .field("lifecycle", &self.lifecycle)
            .field("is_mock", &self.is_mock)
            .field("dependencies", &self.dependencies.names())
            .finish()
    }
}
