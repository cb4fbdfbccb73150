//! 配置管理
//!
//! 进程级注册表通过 `global_registry()` 访问，测试之间用 `reset_global_registry()` 清理。

pub mod defaults;
pub mod registry;
pub mod schema;

pub use registry::{ConfigMap, ConfigPath, ConfigRegistry, RegistryOptions};
pub use schema::{ConfigSchema, MigrationFn};

use crate::errors::ConfigError;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_REGISTRY: Mutex<Option<Arc<ConfigRegistry>>> = Mutex::new(None);
}

/// 获取全局注册表，首次调用时使用默认参数创建
pub fn global_registry() -> Result<Arc<ConfigRegistry>, ConfigError> {
    init_global_registry(RegistryOptions::default())
}

/// 首次调用时按 `options` 创建全局注册表，之后的调用忽略参数
pub fn init_global_registry(options: RegistryOptions) -> Result<Arc<ConfigRegistry>, ConfigError> {
    let mut slot = GLOBAL_REGISTRY.lock();
    if let Some(existing) = slot.as_ref() {
        return Ok(existing.clone());
    }
    let registry = Arc::new(ConfigRegistry::new(options)?);
    *slot = Some(registry.clone());
    Ok(registry)
}

/// 安装一个已构造的注册表，已有实例时保留原实例并返回它
pub fn install_global_registry(registry: Arc<ConfigRegistry>) -> Arc<ConfigRegistry> {
    let mut slot = GLOBAL_REGISTRY.lock();
    slot.get_or_insert(registry).clone()
}

pub fn reset_global_registry() {
    GLOBAL_REGISTRY.lock().take();
}
