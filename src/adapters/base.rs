//! 适配器生命周期契约
//!
//! 每个适配器持有一个 `AdapterCore`，负责状态机、模块配置与数据目录。

use super::state::AdapterState;
use crate::config::{ConfigMap, ConfigRegistry, ConfigSchema};
use crate::errors::{AdapterError, ConfigError};
use crate::infrastructure::container::{short_type_name, DiContainer, InjectionContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 适配器构造参数
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub test_mode: bool,
    /// 为空时使用注册表中的 `data_dir`
    pub data_dir: Option<PathBuf>,
    /// 浅合并到模块配置之上
    pub config_override: Option<ConfigMap>,
    pub verbose: bool,
}

impl AdapterOptions {
    /// 从容器构造上下文继承测试模式、配置覆盖与 verbose
    pub fn from_context(ctx: &InjectionContext<'_>) -> Self {
        Self {
            test_mode: ctx.test_mode(),
            config_override: ctx.config_override().cloned(),
            verbose: ctx.verbose(),
            ..Self::default()
        }
    }

    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_config_override(mut self, config: ConfigMap) -> Self {
        self.config_override = Some(config);
        self
    }
}

/// `DragonAdapter` → `dragon`，`GMGN` → `gmgn`
pub fn module_name_from_type_name(type_name: &str) -> String {
    let base = type_name.rsplit("::").next().unwrap_or(type_name);
    match base.strip_suffix("Adapter") {
        Some(stripped) if !stripped.is_empty() => stripped.to_lowercase(),
        _ => base.to_lowercase(),
    }
}

/// 状态快照，供 CLI 与管理器汇报
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    pub module: String,
    pub state: AdapterState,
    pub ready: bool,
    pub test_mode: bool,
    pub error: Option<String>,
}

pub struct AdapterCore {
    module_name: String,
    test_mode: bool,
    data_dir: PathBuf,
    config_override: Option<ConfigMap>,
    verbose: bool,
    registry: Arc<ConfigRegistry>,
    state: RwLock<AdapterState>,
    error: RwLock<Option<Arc<AdapterError>>>,
    module_config: RwLock<Option<ConfigMap>>,
}

impl AdapterCore {
    /// 以适配器类型名推导模块名
    pub fn for_type<A: ?Sized>(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self::new(
            module_name_from_type_name(&short_type_name::<A>()),
            registry,
            options,
        )
    }

    pub fn new(module_name: String, registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        let data_dir = options.data_dir.unwrap_or_else(|| registry.data_dir());
        Self {
            module_name,
            test_mode: options.test_mode,
            data_dir,
            config_override: options.config_override,
            verbose: options.verbose,
            registry,
            state: RwLock::new(AdapterState::Uninitialized),
            error: RwLock::new(None),
            module_config: RwLock::new(None),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn set_test_mode(&mut self, test_mode: bool) {
        self.test_mode = test_mode;
    }

    pub fn config_override(&self) -> Option<&ConfigMap> {
        self.config_override.as_ref()
    }

    pub fn set_config_override(&mut self, config_override: Option<ConfigMap>) {
        self.config_override = config_override;
        self.module_config.get_mut().take();
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn state(&self) -> AdapterState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == AdapterState::Ready
    }

    pub fn error(&self) -> Option<Arc<AdapterError>> {
        self.error.read().clone()
    }

    /// 切换状态；非法转换返回 `IllegalTransition`，自转换为无操作
    pub fn set_state(&self, state: AdapterState, error: Option<AdapterError>) -> Result<(), AdapterError> {
        let previous = {
            let mut current = self.state.write();
            let previous = *current;
            if previous != state {
                if !previous.can_transition_to(state) {
                    return Err(AdapterError::IllegalTransition {
                        module: self.module_name.clone(),
                        from: previous,
                        to: state,
                    });
                }
                *current = state;
            }
            previous
        };

        if let Some(error) = error {
            let error = Arc::new(error);
            *self.error.write() = Some(error.clone());
            tracing::error!(module = %self.module_name, error = %error, state = %state, "Adapter error");
        }

        if previous != state {
            if self.verbose {
                tracing::info!(module = %self.module_name, from = %previous, to = %state, "Adapter state changed");
            } else {
                tracing::debug!(module = %self.module_name, from = %previous, to = %state, "Adapter state changed");
            }
        }
        Ok(())
    }

    /// 记录错误并进入 `Error`，返回原错误
    pub fn fail(&self, error: AdapterError) -> AdapterError {
        if let Err(e) = self.set_state(AdapterState::Error, Some(error.duplicate())) {
            tracing::warn!(module = %self.module_name, error = %e, "Failed to record adapter error");
        }
        error
    }

    /// 开始清理；没有需要释放的资源时返回 `false`
    pub fn begin_cleanup(&self) -> Result<bool, AdapterError> {
        if !self.state().needs_cleanup() {
            return Ok(false);
        }
        if self.state() == AdapterState::Initializing {
            self.set_state(
                AdapterState::Error,
                Some(AdapterError::Operation("cleanup requested during initialization".to_string())),
            )?;
        }
        self.set_state(AdapterState::CleaningUp, None)?;
        Ok(true)
    }

    /// 模块配置：注册表中的配置加上实例级覆盖（覆盖优先，仅顶层）
    pub fn module_config(&self) -> ConfigMap {
        if let Some(cached) = self.module_config.read().as_ref() {
            return cached.clone();
        }

        let mut config = self.registry.get_module_config(&self.module_name);
        if let Some(overrides) = &self.config_override {
            for (key, value) in overrides {
                config.insert(key.clone(), value.clone());
            }
        }
        *self.module_config.write() = Some(config.clone());
        config
    }

    /// 把模块配置反序列化为强类型设置
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, AdapterError> {
        serde_json::from_value(Value::Object(self.module_config())).map_err(|source| {
            ConfigError::Settings {
                module: self.module_name.clone(),
                source,
            }
            .into()
        })
    }

    /// 注册模块 schema 并执行待处理的迁移
    pub fn install_schema(&self, schema: ConfigSchema) -> Result<(), AdapterError> {
        self.registry.register_schema(&self.module_name, schema)?;
        if let Some(version) = self.registry.migrate_module_config(&self.module_name)? {
            tracing::debug!(module = %self.module_name, %version, "Module config migrated");
        }
        self.module_config.write().take();
        Ok(())
    }

    /// 读取凭证；非测试模式下缺少必需凭证视为配置错误
    pub fn credential(&self, name: &str, required: bool) -> Result<Option<String>, AdapterError> {
        match self.registry.env_var(name) {
            Some(value) => Ok(Some(value)),
            None if required && !self.test_mode => Err(AdapterError::Config(format!(
                "missing required environment variable {} for module '{}'",
                name, self.module_name
            ))),
            None => {
                tracing::debug!(module = %self.module_name, variable = name, "Credential not set");
                Ok(None)
            }
        }
    }

    /// `<data_dir>/<module>[/<data_type>]`，按需创建
    pub fn module_data_dir(&self, data_type: Option<&str>) -> Result<PathBuf, AdapterError> {
        let mut dir = self.data_dir.join(&self.module_name);
        if let Some(data_type) = data_type {
            dir.push(data_type);
        }
        std::fs::create_dir_all(&dir).map_err(|e| {
            AdapterError::Operation(format!(
                "failed to create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(dir)
    }

    /// 创建模块的全部数据子目录，返回模块根目录
    pub fn prepare_data_dirs(&self, subdirs: &[&str]) -> Result<PathBuf, AdapterError> {
        let root = self.module_data_dir(None)?;
        for subdir in subdirs {
            self.module_data_dir(Some(subdir))?;
        }
        Ok(root)
    }

    pub fn status(&self) -> AdapterStatus {
        AdapterStatus {
            module: self.module_name.clone(),
            state: self.state(),
            ready: self.is_ready(),
            test_mode: self.test_mode,
            error: self.error().map(|e| e.to_string()),
        }
    }
}

/// 适配器契约
///
/// 生命周期方法只在 `&self` 上工作，构造后可以通过 `Arc<dyn Adapter>` 共享。
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    fn core(&self) -> &AdapterCore;

    fn core_mut(&mut self) -> &mut AdapterCore;

    /// 加载配置与凭证，成功时进入 `Ready`
    async fn initialize(&self) -> Result<bool, AdapterError>;

    /// 检查适配器是否可用
    async fn validate(&self) -> Result<bool, AdapterError>;

    /// 释放资源，结束于 `CleanedUp`
    async fn cleanup(&self) -> Result<(), AdapterError>;

    fn module_name(&self) -> &str {
        self.core().module_name()
    }

    fn state(&self) -> AdapterState {
        self.core().state()
    }

    fn is_ready(&self) -> bool {
        self.core().is_ready()
    }

    fn describe(&self) -> AdapterStatus {
        self.core().status()
    }
}

/// 容器构造适配器后调用：容器的设置优先于适配器自身的值
pub fn enforce_container_settings<A: Adapter>(adapter: &mut A, container: &DiContainer) {
    let test_mode = container.test_mode();
    let core = adapter.core_mut();

    if core.test_mode() != test_mode {
        tracing::warn!(
            module = %core.module_name(),
            adapter = core.test_mode(),
            container = test_mode,
            "Adapter test_mode differs from container, overriding"
        );
        core.set_test_mode(test_mode);
    }

    if let Some(config_override) = container.config_override() {
        if core.config_override() != Some(&config_override) {
            tracing::warn!(module = %core.module_name(), "Adapter config_override differs from container, overriding");
            core.set_config_override(Some(config_override));
        }
    }
}
