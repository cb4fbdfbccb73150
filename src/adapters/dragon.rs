//! Dragon 工具集适配器
//!
//! 依赖 GMGN 适配器提供行情数据。

use super::base::{Adapter, AdapterCore, AdapterOptions};
use super::gmgn::GmgnAdapter;
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

pub const SOLSCAN_API_KEY_VAR: &str = "SOLSCAN_API_KEY";
pub const ETHERSCAN_API_KEY_VAR: &str = "ETHERSCAN_API_KEY";

const CHAINS: &[&str] = &["Solana", "Ethereum", "GMGN"];
const CHAIN_SUBDIRS: &[&str] = &["TopTraders", "TopHolders", "EarlyBuyers", "BulkWallet"];
const PROXY_DIR: &str = "Proxies";
const PROXY_FILE: &str = "proxies.txt";

pub const DEFAULT_THREADS: u32 = 40;
pub const MAX_THREADS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragonSettings {
    pub threads: u32,
    pub use_proxies: bool,
}

impl Default for DragonSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            use_proxies: false,
        }
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "threads": {"type": "integer", "minimum": 0},
                "use_proxies": {"type": "boolean"}
            }
        }),
        Version::new(1, 0, 0),
    )
    .with_required_env_vars([SOLSCAN_API_KEY_VAR, ETHERSCAN_API_KEY_VAR])
}

/// 线程数归一化：缺省或 0 使用默认值，超过上限时回落到默认值
pub fn handle_threads(threads: Option<u32>) -> u32 {
    match threads {
        None | Some(0) => DEFAULT_THREADS,
        Some(n) if n > MAX_THREADS => DEFAULT_THREADS,
        Some(n) => n,
    }
}

/// Solana 地址长度检查
pub fn validate_solana_address(address: &str) -> bool {
    matches!(address.len(), 43 | 44)
}

/// Ethereum 地址长度检查（允许省略 `0x`）
pub fn validate_ethereum_address(address: &str) -> bool {
    matches!(address.len(), 40..=42)
}

#[derive(Debug, Clone, Default)]
struct DragonCredentials {
    solscan: Option<String>,
    etherscan: Option<String>,
}

pub struct DragonAdapter {
    core: AdapterCore,
    gmgn: Arc<GmgnAdapter>,
    settings: RwLock<Option<DragonSettings>>,
    credentials: RwLock<DragonCredentials>,
}

impl DragonAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, gmgn: Arc<GmgnAdapter>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            gmgn,
            settings: RwLock::new(None),
            credentials: RwLock::new(DragonCredentials::default()),
        }
    }

    pub fn gmgn(&self) -> &Arc<GmgnAdapter> {
        &self.gmgn
    }

    pub fn settings(&self) -> Option<DragonSettings> {
        self.settings.read().clone()
    }

    /// 当前生效的线程数
    pub fn threads(&self) -> u32 {
        handle_threads(self.settings().map(|settings| settings.threads))
    }

    fn proxy_file(&self) -> Result<PathBuf, AdapterError> {
        Ok(self.core.module_data_dir(Some(PROXY_DIR))?.join(PROXY_FILE))
    }

    /// 检查代理文件是否有内容，必要时创建空文件
    pub fn check_proxy_file(&self, create_if_missing: bool) -> Result<bool, AdapterError> {
        let path = self.proxy_file()?;
        if !path.exists() {
            if !create_if_missing {
                return Ok(false);
            }
            std::fs::write(&path, "").map_err(|e| {
                AdapterError::Operation(format!("failed to create {}: {}", path.display(), e))
            })?;
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| AdapterError::ResourceNotFound(format!("{}: {}", path.display(), e)))?;
        Ok(content.lines().any(|line| !line.trim().is_empty()))
    }

    fn data_subdirs() -> Vec<String> {
        let mut dirs: Vec<String> = CHAINS
            .iter()
            .flat_map(|chain| CHAIN_SUBDIRS.iter().map(move |sub| format!("{chain}/{sub}")))
            .collect();
        dirs.push(PROXY_DIR.to_string());
        dirs
    }
}

impl Injectable for DragonAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new()
            .with_dependency::<ConfigRegistry>("config_registry")
            .with_dependency::<GmgnAdapter>("gmgn")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        let gmgn = ctx.get::<GmgnAdapter>("gmgn")?;
        Ok(Self::new(registry, gmgn, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for DragonAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let settings: DragonSettings = self.core.settings()?;
        let credentials = DragonCredentials {
            solscan: self.core.credential(SOLSCAN_API_KEY_VAR, true)?,
            etherscan: self.core.credential(ETHERSCAN_API_KEY_VAR, true)?,
        };
        let subdirs = Self::data_subdirs();
        let subdirs: Vec<&str> = subdirs.iter().map(String::as_str).collect();
        self.core.prepare_data_dirs(&subdirs)?;

        if settings.use_proxies && !self.check_proxy_file(true)? {
            tracing::warn!(module = %self.core.module_name(), "Proxies enabled but proxy file is empty");
        }

        *self.settings.write() = Some(settings);
        *self.credentials.write() = credentials;
        self.core.set_state(AdapterState::Ready, None)?;
        Ok(true)
    }

    /// 需要 GMGN 依赖也处于就绪状态
    async fn validate(&self) -> Result<bool, AdapterError> {
        if !self.core.is_ready() {
            return Ok(false);
        }
        if !self.gmgn.is_ready() {
            tracing::debug!(module = %self.core.module_name(), "GMGN dependency is not ready");
            return Ok(false);
        }
        let credentials = self.credentials.read().clone();
        let credentials_ok =
            self.core.test_mode() || (credentials.solscan.is_some() && credentials.etherscan.is_some());
        Ok(credentials_ok && self.settings().is_some())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        if !self.core.begin_cleanup()? {
            return Ok(());
        }
        self.settings.write().take();
        *self.credentials.write() = DragonCredentials::default();
        self.core.set_state(AdapterState::CleanedUp, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryOptions;

    #[test]
    fn test_handle_threads() {
        assert_eq!(handle_threads(None), 40);
        assert_eq!(handle_threads(Some(0)), 40);
        assert_eq!(handle_threads(Some(8)), 8);
        assert_eq!(handle_threads(Some(100)), 100);
        assert_eq!(handle_threads(Some(101)), 40);
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_solana_address(&"1".repeat(44)));
        assert!(!validate_solana_address("short"));
        assert!(validate_ethereum_address(&format!("0x{}", "a".repeat(40))));
        assert!(!validate_ethereum_address("0x1234"));
    }

    #[tokio::test]
    async fn test_dragon_requires_ready_gmgn() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.path().join("config")),
                Vec::new(),
            )
            .unwrap(),
        );
        let options = AdapterOptions::test().with_data_dir(dir.path().join("data"));
        let gmgn = Arc::new(GmgnAdapter::new(registry.clone(), options.clone()));
        let dragon = DragonAdapter::new(registry, gmgn.clone(), options);
        assert_eq!(dragon.module_name(), "dragon");

        assert!(dragon.initialize().await.unwrap());
        assert!(dir.path().join("data/dragon/Solana/TopTraders").is_dir());
        assert!(dir.path().join("data/dragon/GMGN/BulkWallet").is_dir());
        assert!(!dragon.validate().await.unwrap());

        gmgn.initialize().await.unwrap();
        assert!(dragon.validate().await.unwrap());
        assert_eq!(dragon.threads(), 40);
    }

    #[tokio::test]
    async fn test_check_proxy_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.path().join("config")),
                Vec::new(),
            )
            .unwrap(),
        );
        let options = AdapterOptions::test().with_data_dir(dir.path().join("data"));
        let gmgn = Arc::new(GmgnAdapter::new(registry.clone(), options.clone()));
        let dragon = DragonAdapter::new(registry, gmgn, options);

        assert!(!dragon.check_proxy_file(false).unwrap());
        assert!(!dragon.check_proxy_file(true).unwrap());
        let path = dir.path().join("data/dragon/Proxies/proxies.txt");
        assert!(path.is_file());

        std::fs::write(&path, "\n127.0.0.1:8080\n").unwrap();
        assert!(dragon.check_proxy_file(false).unwrap());
    }
}
