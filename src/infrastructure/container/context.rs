//! 显式依赖声明与构造上下文

use super::registration::{erase, unerase, ErasedInstance};
use super::{short_type_name, ContainerError, DiContainer};
use crate::config::ConfigMap;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

type ErasedResolver = fn(&DiContainer) -> Result<ErasedInstance, ContainerError>;

fn resolve_erased<T: ?Sized + Send + Sync + 'static>(
    container: &DiContainer,
) -> Result<ErasedInstance, ContainerError> {
    container.resolve::<T>().map(erase)
}

fn resolve_mockable_erased<T: Default + Send + Sync + 'static>(
    container: &DiContainer,
) -> Result<ErasedInstance, ContainerError> {
    container.resolve_or_mock::<T>().map(erase)
}

/// 单个依赖：参数名 + 类型
#[derive(Clone)]
pub struct DependencySpec {
    pub name: String,
    pub type_name: String,
    pub(crate) type_id: TypeId,
    pub(crate) resolver: ErasedResolver,
}

impl std::fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.type_name)
    }
}

/// 按声明顺序保存的依赖列表
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    specs: Vec<DependencySpec>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明一个依赖，重复的名称会覆盖之前的声明
    pub fn with_dependency<T: ?Sized + Send + Sync + 'static>(self, name: &str) -> Self {
        self.push(name, short_type_name::<T>(), TypeId::of::<T>(), resolve_erased::<T>)
    }

    /// 测试模式下缺失时自动用 `Default` 生成 mock 的依赖
    pub fn with_mockable_dependency<T: Default + Send + Sync + 'static>(self, name: &str) -> Self {
        self.push(
            name,
            short_type_name::<T>(),
            TypeId::of::<T>(),
            resolve_mockable_erased::<T>,
        )
    }

    fn push(mut self, name: &str, type_name: String, type_id: TypeId, resolver: ErasedResolver) -> Self {
        self.specs.retain(|spec| spec.name != name);
        self.specs.push(DependencySpec {
            name: name.to_string(),
            type_name,
            type_id,
            resolver,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencySpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|spec| spec.name.as_str()).collect()
    }

    pub fn depends_on<T: ?Sized + 'static>(&self) -> bool {
        let target = TypeId::of::<T>();
        self.specs.iter().any(|spec| spec.type_id == target)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// 构造服务时可见的上下文：已解析的依赖和容器设置
pub struct InjectionContext<'a> {
    container: &'a DiContainer,
    service: String,
    values: HashMap<String, ErasedInstance>,
    test_mode: bool,
    config_override: Option<ConfigMap>,
}

impl<'a> InjectionContext<'a> {
    pub(crate) fn new(container: &'a DiContainer, service: String) -> Self {
        Self {
            container,
            service,
            values: HashMap::new(),
            test_mode: container.test_mode(),
            config_override: container.config_override(),
        }
    }

    pub(crate) fn insert(&mut self, name: &str, value: ErasedInstance) {
        self.values.insert(name.to_string(), value);
    }

    /// 取出已解析的依赖
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ContainerError::MissingDependency {
                service: self.service.clone(),
                dependency: name.to_string(),
            })?;
        unerase::<T>(value)
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn config_override(&self) -> Option<&ConfigMap> {
        self.config_override.as_ref()
    }

    /// 读取容器当前的 verbose 设置
    pub fn verbose(&self) -> bool {
        self.container.verbose()
    }
}

/// 可以由容器构造的类型
///
/// 依赖通过 `dependencies()` 显式声明，构造时从上下文中按名称取出。
pub trait Injectable: Send + Sync + Sized + 'static {
    fn dependencies() -> DependencyMap {
        DependencyMap::new()
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError>;
}
