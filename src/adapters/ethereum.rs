//! Ethereum 链上数据适配器

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
use std::sync::Arc;

pub const ETHERSCAN_API_KEY_VAR: &str = "ETHERSCAN_API_KEY";
pub const RPC_URL_VAR: &str = "ETHEREUM_RPC_URL";
const DATA_SUBDIRS: &[&str] = &["transaction-data", "wallet-data"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthereumSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub etherscan_api_url: String,
}

impl Default for EthereumSettings {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            etherscan_api_url: "https://api.etherscan.io/api".to_string(),
        }
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "rpc_url": {"type": "string", "minLength": 1},
                "chain_id": {"type": "integer", "minimum": 1},
                "etherscan_api_url": {"type": "string", "minLength": 1}
            }
        }),
        Version::new(1, 0, 0),
    )
    .with_required_env_vars([ETHERSCAN_API_KEY_VAR, RPC_URL_VAR])
}

pub struct EthereumAdapter {
    core: AdapterCore,
    settings: RwLock<Option<EthereumSettings>>,
    api_key: RwLock<Option<String>>,
}

impl EthereumAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            settings: RwLock::new(None),
            api_key: RwLock::new(None),
        }
    }

    /// 初始化后的设置，`rpc_url` 已应用环境变量
    pub fn settings(&self) -> Option<EthereumSettings> {
        self.settings.read().clone()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }

    /// `0x` 前缀加 40 位十六进制
    pub fn validate_address(address: &str) -> bool {
        address
            .strip_prefix("0x")
            .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl Injectable for EthereumAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new().with_dependency::<ConfigRegistry>("config_registry")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        Ok(Self::new(registry, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for EthereumAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let mut settings: EthereumSettings = self.core.settings()?;
        if let Some(rpc_url) = self.core.credential(RPC_URL_VAR, false)? {
            settings.rpc_url = rpc_url;
        }
        let api_key = self.core.credential(ETHERSCAN_API_KEY_VAR, true)?;
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
        Ok(credentials_ok && settings.chain_id > 0 && settings.rpc_url.starts_with("http"))
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

    #[test]
    fn test_validate_address() {
        assert!(EthereumAdapter::validate_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!EthereumAdapter::validate_address(
            "52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!EthereumAdapter::validate_address(
            "0xZZ908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!EthereumAdapter::validate_address("0x1234"));
    }

    #[tokio::test]
    async fn test_rpc_url_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.path().join("config")),
                vec![
                    (RPC_URL_VAR.to_string(), "https://node.example.test".to_string()),
                    ("SOL_TOOLS_ETHEREUM__CHAIN_ID".to_string(), "5".to_string()),
                ],
            )
            .unwrap(),
        );
        let ethereum = EthereumAdapter::new(
            registry,
            AdapterOptions::test().with_data_dir(dir.path().join("data")),
        );

        assert!(ethereum.initialize().await.unwrap());
        let settings = ethereum.settings().unwrap();
        assert_eq!(settings.rpc_url, "https://node.example.test");
        assert_eq!(settings.chain_id, 5);
        assert!(!ethereum.has_api_key());
        assert!(ethereum.validate().await.unwrap());
        assert!(dir.path().join("data/ethereum/wallet-data").is_dir());
    }
}
