//! 容器实现

use super::context::{Injectable, InjectionContext};
use super::registration::{
    erase, unerase, DependencyRegistration, ErasedFactory, ErasedInstance, ErasedView,
};
use super::{short_type_name, ContainerError, DependencyMap, Lifecycle};
use crate::adapters::{enforce_container_settings, Adapter};
use crate::config::ConfigMap;
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// 容器的测试模式标记，构造时自动注册为实例
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestMode(pub bool);

#[derive(Debug, Clone, Default)]
struct ContainerSettings {
    test_mode: bool,
    config_override: Option<ConfigMap>,
    verbose: bool,
}

/// 内部统计（原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicU64,
    cache_hits: AtomicU64,
    instances_created: AtomicU64,
    mocks_created: AtomicU64,
    cycles_detected: AtomicU64,
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub total_resolutions: u64,
    pub cache_hits: u64,
    pub instances_created: u64,
    pub mocks_created: u64,
    pub cycles_detected: u64,
    pub registered_services: usize,
    pub active_singletons: usize,
}

impl ContainerStats {
    /// 单例缓存命中率（百分比）
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / self.total_resolutions as f64) * 100.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} resolutions, {:.1}% cache hit rate, {} registered services, {} active singletons",
            self.total_resolutions,
            self.cache_hit_rate(),
            self.registered_services,
            self.active_singletons
        )
    }
}

type ResolutionStacks = Mutex<HashMap<ThreadId, Vec<(TypeId, String)>>>;

/// 解析栈守卫，离开作用域时出栈
struct ResolutionGuard<'a> {
    stacks: &'a ResolutionStacks,
    thread: ThreadId,
}

impl<'a> ResolutionGuard<'a> {
    fn push(stacks: &'a ResolutionStacks, thread: ThreadId, key: TypeId, name: &str) -> Self {
        stacks
            .lock()
            .entry(thread)
            .or_default()
            .push((key, name.to_string()));
        Self { stacks, thread }
    }
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        let mut stacks = self.stacks.lock();
        if let Some(stack) = stacks.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                stacks.remove(&self.thread);
            }
        }
    }
}

/// 依赖注入容器
///
/// 注册表用读写锁保护，构造函数和工厂执行期间不持有任何锁。
/// 解析栈按线程区分，不同线程的循环检测互不干扰。
pub struct DiContainer {
    registrations: RwLock<HashMap<TypeId, Arc<DependencyRegistration>>>,
    settings: RwLock<ContainerSettings>,
    resolution_stacks: ResolutionStacks,
    sequence: AtomicU64,
    stats: InnerStats,
}

impl Default for DiContainer {
    fn default() -> Self {
        Self::new(false, None)
    }
}

impl std::fmt::Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiContainer")
            .field("test_mode", &self.test_mode())
            .field("registered_services", &self.registered_services())
            .finish()
    }
}

impl DiContainer {
    pub fn new(test_mode: bool, config_override: Option<ConfigMap>) -> Self {
        let container = Self {
            registrations: RwLock::new(HashMap::new()),
            settings: RwLock::new(ContainerSettings {
                test_mode,
                config_override,
                verbose: false,
            }),
            resolution_stacks: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            stats: InnerStats::default(),
        };
        container.install_test_mode();
        container
    }

    pub fn test_mode(&self) -> bool {
        self.settings.read().test_mode
    }

    pub fn config_override(&self) -> Option<ConfigMap> {
        self.settings.read().config_override.clone()
    }

    pub fn verbose(&self) -> bool {
        self.settings.read().verbose
    }

    /// 之后构造的适配器以 `info` 级别记录状态转换
    pub fn set_verbose(&self, verbose: bool) {
        self.settings.write().verbose = verbose;
    }

    /// 更新测试模式与配置覆盖，只影响之后构造的服务
    pub fn configure(&self, test_mode: bool, config_override: Option<ConfigMap>) {
        {
            let mut settings = self.settings.write();
            settings.test_mode = test_mode;
            settings.config_override = config_override;
        }
        self.install_test_mode();
        tracing::debug!(test_mode, "Container reconfigured");
    }

    fn install_test_mode(&self) {
        let registration = DependencyRegistration::new::<TestMode>(Lifecycle::Singleton)
            .with_instance(Arc::new(TestMode(self.test_mode())));
        self.insert(registration);
    }

    fn insert(&self, mut registration: DependencyRegistration) {
        registration.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .registrations
            .write()
            .insert(registration.interface, Arc::new(registration));
        if let Some(previous) = replaced {
            tracing::debug!(
                service = %previous.interface_name,
                "Replaced existing registration"
            );
        }
    }

    /// 注册一条完整的注册信息，校验失败时拒绝
    pub fn register(&self, registration: DependencyRegistration) -> Result<(), ContainerError> {
        registration.validate()?;
        tracing::debug!(
            service = %registration.interface_name,
            implementation = %registration.implementation_name,
            lifecycle = %registration.lifecycle,
            mock = registration.is_mock,
            "Registered dependency"
        );
        self.insert(registration);
        Ok(())
    }

    /// 注册可注入类型；`dependencies` 为空时使用类型自身的声明
    pub fn register_type<T: Injectable>(
        &self,
        lifecycle: Lifecycle,
        dependencies: Option<DependencyMap>,
    ) -> Result<(), ContainerError> {
        self.register_injectable::<T, T>(lifecycle, dependencies, |value| value, None)
    }

    /// 以接口类型注册实现，接口可以是 trait object
    pub fn register_type_as<I, T>(
        &self,
        lifecycle: Lifecycle,
        dependencies: Option<DependencyMap>,
        upcast: fn(Arc<T>) -> Arc<I>,
    ) -> Result<(), ContainerError>
    where
        I: ?Sized + Send + Sync + 'static,
        T: Injectable,
    {
        self.register_injectable::<I, T>(lifecycle, dependencies, upcast, None)
    }

    /// 注册适配器：构造后强制同步容器的测试模式与配置覆盖，并加入 `resolve_all::<dyn Adapter>()`
    pub fn register_adapter<A: Adapter + Injectable>(
        &self,
        lifecycle: Lifecycle,
        dependencies: Option<DependencyMap>,
    ) -> Result<(), ContainerError> {
        self.register_injectable::<A, A>(
            lifecycle,
            dependencies,
            |value| value,
            Some(enforce_container_settings::<A>),
        )?;
        self.add_view::<A, dyn Adapter>(|adapter| adapter)
    }

    fn register_injectable<I, T>(
        &self,
        lifecycle: Lifecycle,
        dependencies: Option<DependencyMap>,
        upcast: fn(Arc<T>) -> Arc<I>,
        hook: Option<fn(&mut T, &DiContainer)>,
    ) -> Result<(), ContainerError>
    where
        I: ?Sized + Send + Sync + 'static,
        T: Injectable,
    {
        let dependencies = dependencies.unwrap_or_else(T::dependencies);
        let factory: ErasedFactory = Arc::new(
            move |container: &DiContainer, ctx: &InjectionContext<'_>| {
                let mut value = T::construct(ctx)?;
                if let Some(hook) = hook {
                    hook(&mut value, container);
                }
                Ok(erase(upcast(Arc::new(value))))
            },
        );
        let registration = DependencyRegistration::new::<I>(lifecycle)
            .with_implementation_name(short_type_name::<T>())
            .with_dependencies(dependencies)
            .with_erased_factory(factory);
        self.register(registration)
    }

    /// 注册预构建实例，生命周期固定为单例
    pub fn register_instance<I: ?Sized + Send + Sync + 'static>(
        &self,
        instance: Arc<I>,
    ) -> Result<(), ContainerError> {
        self.register(DependencyRegistration::new::<I>(Lifecycle::Singleton).with_instance(instance))
    }

    /// 注册工厂，工厂可以通过容器解析自己的依赖
    pub fn register_factory<I, F>(&self, factory: F, lifecycle: Lifecycle) -> Result<(), ContainerError>
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&DiContainer) -> Result<Arc<I>, ContainerError> + Send + Sync + 'static,
    {
        self.register(DependencyRegistration::new::<I>(lifecycle).with_factory(factory))
    }

    /// 注册测试替身
    pub fn register_mock<I: ?Sized + Send + Sync + 'static>(
        &self,
        mock: Arc<I>,
    ) -> Result<(), ContainerError> {
        self.register(
            DependencyRegistration::new::<I>(Lifecycle::Singleton)
                .with_instance(mock)
                .as_mock(),
        )
    }

    /// 为已注册的 `I` 声明到 `B` 的转换，`resolve_all::<B>()` 会包含它
    pub fn add_view<I, B>(&self, upcast: fn(Arc<I>) -> Arc<B>) -> Result<(), ContainerError>
    where
        I: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
    {
        let registration = self.registration::<I>()?;
        let view: ErasedView = Arc::new(move |erased: &ErasedInstance| {
            erased
                .downcast_ref::<Arc<I>>()
                .map(|instance| erase(upcast(instance.clone())))
        });
        registration.views.write().insert(TypeId::of::<B>(), view);
        Ok(())
    }

    fn registration<I: ?Sized + 'static>(&self) -> Result<Arc<DependencyRegistration>, ContainerError> {
        self.registrations
            .read()
            .get(&TypeId::of::<I>())
            .cloned()
            .ok_or_else(|| ContainerError::DependencyNotFound {
                type_name: short_type_name::<I>(),
            })
    }

    /// 解析依赖
    ///
    /// 未注册的类型即使在测试模式下也返回 `DependencyNotFound`；
    /// 需要自动 mock 时使用 [`DiContainer::resolve_or_mock`]。
    pub fn resolve<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>, ContainerError> {
        let erased = self.resolve_key(TypeId::of::<I>(), &short_type_name::<I>())?;
        unerase::<I>(&erased)
    }

    /// 测试模式下，未注册的类型会用 `Default` 生成并注册为 mock
    pub fn resolve_or_mock<T: Default + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, ContainerError> {
        if self.is_registered::<T>() || !self.test_mode() {
            return self.resolve::<T>();
        }

        let name = short_type_name::<T>();
        tracing::warn!(service = %name, "Auto-registering mock for unregistered dependency");
        let mock = Arc::new(T::default());
        self.register_mock::<T>(mock.clone())?;
        self.stats.mocks_created.fetch_add(1, Ordering::Relaxed);
        Ok(mock)
    }

    /// 解析所有可以视为 `B` 的注册，按注册顺序返回
    pub fn resolve_all<B: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<B>>, ContainerError> {
        let target = TypeId::of::<B>();
        let mut candidates: Vec<(u64, TypeId, String, Option<ErasedView>)> = self
            .registrations
            .read()
            .values()
            .filter_map(|registration| {
                if registration.interface == target {
                    Some((registration.sequence, registration.interface, registration.interface_name.clone(), None))
                } else {
                    registration.view(target).map(|view| {
                        (registration.sequence, registration.interface, registration.interface_name.clone(), Some(view))
                    })
                }
            })
            .collect();
        candidates.sort_by_key(|(sequence, ..)| *sequence);

        candidates
            .into_iter()
            .map(|(_, key, name, view)| {
                let erased = self.resolve_key(key, &name)?;
                let projected = match view {
                    Some(view) => view(&erased).ok_or_else(|| ContainerError::TypeMismatch {
                        expected: short_type_name::<B>(),
                        found: name.clone(),
                    })?,
                    None => erased,
                };
                unerase::<B>(&projected)
            })
            .collect()
    }

    fn resolve_key(&self, key: TypeId, name: &str) -> Result<ErasedInstance, ContainerError> {
        self.stats.total_resolutions.fetch_add(1, Ordering::Relaxed);
        let thread = std::thread::current().id();

        if let Some(chain) = self.cycle_chain(thread, key, name) {
            self.stats.cycles_detected.fetch_add(1, Ordering::Relaxed);
            return Err(ContainerError::CircularDependency { chain });
        }

        let registration = self
            .registrations
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ContainerError::DependencyNotFound {
                type_name: name.to_string(),
            })?;

        if registration.lifecycle.is_shared() {
            if let Some(instance) = registration.cached_instance() {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(instance);
            }
        }

        let _guard = ResolutionGuard::push(&self.resolution_stacks, thread, key, name);
        let service = registration.implementation_name.clone();

        let mut ctx = InjectionContext::new(self, service.clone());
        for spec in registration.dependencies.iter() {
            match (spec.resolver)(self) {
                Ok(value) => ctx.insert(&spec.name, value),
                Err(err @ ContainerError::CircularDependency { .. }) => return Err(err),
                Err(err) => {
                    return Err(ContainerError::DependencyResolution {
                        service,
                        dependency: spec.name.clone(),
                        source: Box::new(err),
                    })
                }
            }
        }

        let factory = registration
            .factory
            .clone()
            .ok_or_else(|| ContainerError::CreationFailed {
                type_name: service.clone(),
                reason: "registration has no factory".to_string(),
            })?;
        let instance = factory(self, &ctx)?;
        self.stats.instances_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(service = %service, lifecycle = %registration.lifecycle, "Created instance");

        if registration.lifecycle.is_shared() {
            Ok(registration.store_instance(instance))
        } else {
            Ok(instance)
        }
    }

    fn cycle_chain(&self, thread: ThreadId, key: TypeId, name: &str) -> Option<Vec<String>> {
        let stacks = self.resolution_stacks.lock();
        let stack = stacks.get(&thread)?;
        if !stack.iter().any(|(id, _)| *id == key) {
            return None;
        }
        let mut chain: Vec<String> = stack.iter().map(|(_, entry)| entry.clone()).collect();
        chain.push(name.to_string());
        Some(chain)
    }

    pub fn is_registered<I: ?Sized + 'static>(&self) -> bool {
        self.registrations.read().contains_key(&TypeId::of::<I>())
    }

    pub fn is_mock<I: ?Sized + 'static>(&self) -> bool {
        self.registrations
            .read()
            .get(&TypeId::of::<I>())
            .map(|registration| registration.is_mock)
            .unwrap_or(false)
    }

    /// 已注册服务名，按注册顺序
    pub fn registered_services(&self) -> Vec<String> {
        let registrations = self.registrations.read();
        let mut entries: Vec<(u64, String)> = registrations
            .values()
            .map(|registration| (registration.sequence, registration.interface_name.clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// 清空所有注册，保留测试模式标记
    pub fn clear_registrations(&self) {
        self.registrations.write().clear();
        self.install_test_mode();
    }

    /// 丢弃缓存的单例，预注册的实例保留
    pub fn clear_instances(&self) {
        for registration in self.registrations.read().values() {
            registration.clear_cached();
        }
    }

    pub fn stats(&self) -> ContainerStats {
        let registrations = self.registrations.read();
        ContainerStats {
            total_resolutions: self.stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            instances_created: self.stats.instances_created.load(Ordering::Relaxed),
            mocks_created: self.stats.mocks_created.load(Ordering::Relaxed),
            cycles_detected: self.stats.cycles_detected.load(Ordering::Relaxed),
            registered_services: registrations.len(),
            active_singletons: registrations
                .values()
                .filter(|registration| registration.has_live_instance())
                .count(),
        }
    }
}
