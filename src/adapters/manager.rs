//! 适配器管理器
//!
//! 按注册顺序初始化、校验，按逆序清理。单个适配器失败不会中断其他适配器。

use super::base::{Adapter, AdapterStatus};
use crate::errors::AdapterError;
use crate::infrastructure::container::{ContainerError, DiContainer};
use crate::logging::OperationTimer;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// 初始化适配器；返回错误时适配器一定处于 `Error`
pub async fn initialize_adapter(adapter: &dyn Adapter) -> Result<bool, AdapterError> {
    let timer = OperationTimer::new("adapter.initialize").with_metadata("module", adapter.module_name());
    let result = adapter.initialize().await;
    timer.finish();
    result.map_err(|err| adapter.core().fail(err))
}

pub async fn validate_adapter(adapter: &dyn Adapter) -> Result<bool, AdapterError> {
    adapter
        .validate()
        .await
        .map_err(|err| adapter.core().fail(err))
}

pub async fn cleanup_adapter(adapter: &dyn Adapter) -> Result<(), AdapterError> {
    let timer = OperationTimer::new("adapter.cleanup").with_metadata("module", adapter.module_name());
    let result = adapter.cleanup().await;
    timer.finish();
    result.map_err(|err| adapter.core().fail(err))
}

/// 一轮生命周期操作的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl LifecycleReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, module: &str, outcome: Result<bool, AdapterError>, rejected: &str) {
        match outcome {
            Ok(true) => self.succeeded.push(module.to_string()),
            Ok(false) => self.failed.push((module.to_string(), rejected.to_string())),
            Err(err) => self.failed.push((module.to_string(), err.to_string())),
        }
    }
}

#[derive(Default)]
pub struct AdapterManager {
    adapters: RwLock<Vec<Arc<dyn Adapter>>>,
}

impl AdapterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收集容器中所有注册为适配器的服务
    pub fn from_container(container: &DiContainer) -> Result<Self, ContainerError> {
        let manager = Self::new();
        for adapter in container.resolve_all::<dyn Adapter>()? {
            manager.register(adapter);
        }
        Ok(manager)
    }

    /// 注册适配器，同名模块只保留第一个
    pub fn register(&self, adapter: Arc<dyn Adapter>) -> bool {
        let mut adapters = self.adapters.write();
        if adapters
            .iter()
            .any(|existing| existing.module_name() == adapter.module_name())
        {
            return false;
        }
        adapters.push(adapter);
        true
    }

    pub fn get(&self, module: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .read()
            .iter()
            .find(|adapter| adapter.module_name() == module)
            .cloned()
    }

    pub fn modules(&self) -> Vec<String> {
        self.adapters
            .read()
            .iter()
            .map(|adapter| adapter.module_name().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Adapter>> {
        self.adapters.read().clone()
    }

    pub async fn initialize_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for adapter in self.snapshot() {
            let outcome = initialize_adapter(adapter.as_ref()).await;
            if let Err(err) = &outcome {
                tracing::warn!(module = %adapter.module_name(), error = %err, "Adapter failed to initialize");
            }
            report.record(adapter.module_name(), outcome, "initialization did not complete");
        }
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Adapters initialized"
        );
        report
    }

    pub async fn validate_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for adapter in self.snapshot() {
            let outcome = validate_adapter(adapter.as_ref()).await;
            report.record(adapter.module_name(), outcome, "validation failed");
        }
        report
    }

    /// 逆序清理
    pub async fn cleanup_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for adapter in self.snapshot().into_iter().rev() {
            let outcome = cleanup_adapter(adapter.as_ref()).await.map(|_| true);
            report.record(adapter.module_name(), outcome, "cleanup failed");
        }
        report
    }

    pub fn statuses(&self) -> Vec<AdapterStatus> {
        self.snapshot()
            .iter()
            .map(|adapter| adapter.describe())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::base::{AdapterCore, AdapterOptions};
    use crate::adapters::AdapterState;
    use crate::config::{ConfigRegistry, RegistryOptions};
    use async_trait::async_trait;

    struct FlakyAdapter {
        core: AdapterCore,
        fail_init: bool,
    }

    impl FlakyAdapter {
        fn new(name: &str, fail_init: bool) -> Arc<dyn Adapter> {
            let dir = std::env::temp_dir();
            let registry = Arc::new(
                ConfigRegistry::from_sources(
                    RegistryOptions::test().with_config_dir(dir.join("sol-tools-manager-test")),
                    Vec::new(),
                )
                .unwrap(),
            );
            Arc::new(FlakyAdapter {
                core: AdapterCore::new(name.to_string(), registry, AdapterOptions::test()),
                fail_init,
            })
        }
    }

    #[async_trait]
    impl Adapter for FlakyAdapter {
        fn core(&self) -> &AdapterCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut AdapterCore {
            &mut self.core
        }

        async fn initialize(&self) -> Result<bool, AdapterError> {
            self.core.set_state(AdapterState::Initializing, None)?;
            if self.fail_init {
                return Err(AdapterError::Initialization("upstream unavailable".into()));
            }
            self.core.set_state(AdapterState::Ready, None)?;
            Ok(true)
        }

        async fn validate(&self) -> Result<bool, AdapterError> {
            Ok(self.core.is_ready())
        }

        async fn cleanup(&self) -> Result<(), AdapterError> {
            if self.core.begin_cleanup()? {
                self.core.set_state(AdapterState::CleanedUp, None)?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_initialization_leaves_error_state() {
        let adapter = FlakyAdapter::new("flaky", true);
        let err = initialize_adapter(adapter.as_ref()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Initialization(_)));
        assert_eq!(adapter.state(), AdapterState::Error);
        assert!(adapter.core().error().is_some());
    }

    #[tokio::test]
    async fn test_manager_runs_full_lifecycle() {
        let manager = AdapterManager::new();
        assert!(manager.register(FlakyAdapter::new("good", false)));
        assert!(manager.register(FlakyAdapter::new("bad", true)));
        assert!(!manager.register(FlakyAdapter::new("good", false)));
        assert_eq!(manager.modules(), vec!["good", "bad"]);

        let init = manager.initialize_all().await;
        assert_eq!(init.succeeded, vec!["good"]);
        assert_eq!(init.failed.len(), 1);
        assert!(!init.is_success());

        let validation = manager.validate_all().await;
        assert_eq!(validation.succeeded, vec!["good"]);

        let cleanup = manager.cleanup_all().await;
        assert_eq!(cleanup.succeeded, vec!["bad", "good"]);
        let states: Vec<AdapterState> = manager.statuses().iter().map(|s| s.state).collect();
        assert_eq!(states, vec![AdapterState::CleanedUp, AdapterState::CleanedUp]);
    }
}
