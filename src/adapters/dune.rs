//! Dune Analytics 适配器

use super::base::{Adapter, AdapterCore, AdapterOptions};
use super::state::AdapterState;
use crate::config::{ConfigRegistry, ConfigSchema};
use crate::errors::AdapterError;
use crate::infrastructure::container::{ContainerError, DependencyMap, Injectable, InjectionContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

pub const API_KEY_VAR: &str = "DUNE_API_KEY";
const DATA_SUBDIRS: &[&str] = &["csv", "parsed"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuneSettings {
    /// 每批并发执行的查询数
    pub batch_size: u32,
    /// 批次之间的等待秒数
    pub batch_delay: u64,
}

impl Default for DuneSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_delay: 30,
        }
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "batch_size": {"type": "integer", "minimum": 1},
                "batch_delay": {"type": "integer", "minimum": 0}
            }
        }),
        Version::new(1, 0, 0),
    )
    .with_required_env_vars([API_KEY_VAR])
}

pub struct DuneAdapter {
    core: AdapterCore,
    settings: RwLock<Option<DuneSettings>>,
    api_key: RwLock<Option<String>>,
}

impl DuneAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            settings: RwLock::new(None),
            api_key: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> Option<DuneSettings> {
        self.settings.read().clone()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }

    /// 替换 API key，空字符串视为清除
    pub fn set_api_key(&self, api_key: &str) -> bool {
        let api_key = api_key.trim();
        *self.api_key.write() = (!api_key.is_empty()).then(|| api_key.to_string());
        self.has_api_key()
    }

    fn csv_dir(&self) -> Result<PathBuf, AdapterError> {
        self.core.module_data_dir(Some("csv"))
    }

    /// 列出 csv 目录下的文件名，按名称排序
    pub fn available_csvs(&self) -> Result<Vec<String>, AdapterError> {
        let dir = self.csv_dir()?;
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            AdapterError::ResourceNotFound(format!("{}: {}", dir.display(), e))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// 删除 csv 目录中的文件，文件不存在时返回 `false`
    pub fn delete_csv(&self, file_name: &str) -> Result<bool, AdapterError> {
        if file_name.contains(['/', '\\']) || file_name == ".." {
            return Err(AdapterError::Validation(format!("invalid csv file name '{file_name}'")));
        }
        let path = self.csv_dir()?.join(file_name);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| {
            AdapterError::Operation(format!("failed to delete {}: {}", path.display(), e))
        })?;
        Ok(true)
    }
}

impl Injectable for DuneAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new().with_dependency::<ConfigRegistry>("config_registry")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        Ok(Self::new(registry, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for DuneAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let settings: DuneSettings = self.core.settings()?;
        let api_key = self.core.credential(API_KEY_VAR, true)?;
        self.core.prepare_data_dirs(DATA_SUBDIRS)?;

        *self.settings.write() = Some(settings);
        *self.api_key.write() = api_key;
        self.core.set_state(AdapterState::Ready, None)?;
        Ok(true)
    }

    async fn validate(&self) -> Result<bool, AdapterError> {
        if !self.core.is_ready() {
            return Ok(false);
        }
        let Some(settings) = self.settings() else {
            return Ok(false);
        };
        let credentials_ok = self.core.test_mode() || self.has_api_key();
        Ok(settings.batch_size > 0
            && credentials_ok
            && self.core.registry().validate_module_config(self.core.module_name()))
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        if !self.core.begin_cleanup()? {
            return Ok(());
        }
        self.settings.write().take();
        self.api_key.write().take();
        self.core.set_state(AdapterState::CleanedUp, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryOptions;
    use std::path::Path;

    fn adapter(dir: &Path, env: Vec<(String, String)>, test_mode: bool) -> DuneAdapter {
        let options = RegistryOptions {
            test_mode,
            config_dir: Some(dir.join("config")),
            env_file: None,
        };
        let registry = Arc::new(ConfigRegistry::from_sources(options, env).unwrap());
        let options = AdapterOptions {
            test_mode,
            ..AdapterOptions::default()
        }
        .with_data_dir(dir.join("data"));
        DuneAdapter::new(registry, options)
    }

    #[tokio::test]
    async fn test_initialize_creates_directories_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let dune = adapter(dir.path(), Vec::new(), true);
        assert_eq!(dune.module_name(), "dune");

        assert!(dune.initialize().await.unwrap());
        assert!(dune.is_ready());
        assert_eq!(dune.settings(), Some(DuneSettings::default()));
        assert!(dir.path().join("data/dune/csv").is_dir());
        assert!(dir.path().join("data/dune/parsed").is_dir());
        assert!(dune.validate().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_outside_test_mode() {
        let dir = tempfile::tempdir().unwrap();
        let dune = adapter(dir.path(), Vec::new(), false);
        let err = dune.initialize().await.unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[tokio::test]
    async fn test_csv_listing_and_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let env = vec![(API_KEY_VAR.to_string(), "key".to_string())];
        let dune = adapter(dir.path(), env, false);
        dune.initialize().await.unwrap();
        assert!(dune.has_api_key());

        let csv_dir = dir.path().join("data/dune/csv");
        std::fs::write(csv_dir.join("b.csv"), "x").unwrap();
        std::fs::write(csv_dir.join("a.csv"), "x").unwrap();
        std::fs::write(csv_dir.join("notes.txt"), "x").unwrap();
        assert_eq!(dune.available_csvs().unwrap(), vec!["a.csv", "b.csv"]);

        assert!(dune.delete_csv("a.csv").unwrap());
        assert!(!dune.delete_csv("a.csv").unwrap());
        assert!(dune.delete_csv("../escape.csv").is_err());
        assert_eq!(dune.available_csvs().unwrap(), vec!["b.csv"]);
    }

    #[tokio::test]
    async fn test_cleanup_releases_state() {
        let dir = tempfile::tempdir().unwrap();
        let dune = adapter(dir.path(), Vec::new(), true);
        dune.cleanup().await.unwrap();
        assert_eq!(dune.state(), AdapterState::Uninitialized);

        dune.initialize().await.unwrap();
        assert!(!dune.set_api_key("  "));
        assert!(dune.set_api_key("fresh"));
        dune.cleanup().await.unwrap();
        assert_eq!(dune.state(), AdapterState::CleanedUp);
        assert!(dune.settings().is_none());
        assert!(!dune.has_api_key());
    }
}
