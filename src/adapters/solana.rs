//! Solana 链上数据适配器

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

pub const HELIUS_API_KEY_VAR: &str = "HELIUS_API_KEY";
pub const RPC_URL_VAR: &str = "SOLANA_RPC_URL";
pub const WEBSOCKET_URL_VAR: &str = "SOLANA_WEBSOCKET_URL";
const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_VAR: &str = "TELEGRAM_CHAT_ID";

const DATA_SUBDIRS: &[&str] = &["wallets", "tokens", "telegram", "cache"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolanaSettings {
    pub rpc_url: String,
    pub websocket_url: String,
    pub commitment: String,
    /// 代币监控的最小数量
    pub min_token_amount: f64,
}

impl Default for SolanaSettings {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            websocket_url: "wss://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            min_token_amount: 1000.0,
        }
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "rpc_url": {"type": "string", "minLength": 1},
                "websocket_url": {"type": "string", "minLength": 1},
                "commitment": {"enum": ["processed", "confirmed", "finalized"]},
                "min_token_amount": {"type": "number", "minimum": 0}
            }
        }),
        Version::new(1, 0, 0),
    )
    .with_required_env_vars([HELIUS_API_KEY_VAR, RPC_URL_VAR, WEBSOCKET_URL_VAR])
}

/// 运行时生效的连接信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolanaEndpoints {
    pub rpc_url: String,
    pub websocket_url: String,
    pub helius_api_key: Option<String>,
    pub telegram_configured: bool,
}

pub struct SolanaAdapter {
    core: AdapterCore,
    settings: RwLock<Option<SolanaSettings>>,
    endpoints: RwLock<Option<SolanaEndpoints>>,
}

impl SolanaAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            settings: RwLock::new(None),
            endpoints: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> Option<SolanaSettings> {
        self.settings.read().clone()
    }

    pub fn endpoints(&self) -> Option<SolanaEndpoints> {
        self.endpoints.read().clone()
    }

    pub fn telegram_configured(&self) -> bool {
        self.endpoints()
            .map(|endpoints| endpoints.telegram_configured)
            .unwrap_or(false)
    }

    pub fn validate_address(address: &str) -> bool {
        matches!(address.len(), 43 | 44)
    }
}

impl Injectable for SolanaAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new().with_dependency::<ConfigRegistry>("config_registry")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        Ok(Self::new(registry, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for SolanaAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let settings: SolanaSettings = self.core.settings()?;
        // 环境变量中的地址优先于配置文件
        let endpoints = SolanaEndpoints {
            rpc_url: self
                .core
                .credential(RPC_URL_VAR, false)?
                .unwrap_or_else(|| settings.rpc_url.clone()),
            websocket_url: self
                .core
                .credential(WEBSOCKET_URL_VAR, false)?
                .unwrap_or_else(|| settings.websocket_url.clone()),
            helius_api_key: self.core.credential(HELIUS_API_KEY_VAR, true)?,
            telegram_configured: self.core.credential(TELEGRAM_TOKEN_VAR, false)?.is_some()
                && self.core.credential(TELEGRAM_CHAT_VAR, false)?.is_some(),
        };
        self.core.prepare_data_dirs(DATA_SUBDIRS)?;

        *self.settings.write() = Some(settings);
        *self.endpoints.write() = Some(endpoints);
        self.core.set_state(AdapterState::Ready, None)?;
        Ok(true)
    }

    async fn validate(&self) -> Result<bool, AdapterError> {
        if !self.core.is_ready() {
            return Ok(false);
        }
        let Some(endpoints) = self.endpoints() else {
            return Ok(false);
        };
        let urls_ok = endpoints.rpc_url.starts_with("http")
            && (endpoints.websocket_url.starts_with("ws://")
                || endpoints.websocket_url.starts_with("wss://"));
        let key_ok = self.core.test_mode() || endpoints.helius_api_key.is_some();
        Ok(urls_ok && key_ok)
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        if !self.core.begin_cleanup()? {
            return Ok(());
        }
        self.settings.write().take();
        self.endpoints.write().take();
        self.core.set_state(AdapterState::CleanedUp, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryOptions;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_env_endpoints_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.path().join("config")),
                env(&[
                    (RPC_URL_VAR, "https://rpc.example.test"),
                    (HELIUS_API_KEY_VAR, "helius"),
                    (TELEGRAM_TOKEN_VAR, "token"),
                ]),
            )
            .unwrap(),
        );
        let solana = SolanaAdapter::new(
            registry,
            AdapterOptions::test().with_data_dir(dir.path().join("data")),
        );

        assert!(solana.initialize().await.unwrap());
        let endpoints = solana.endpoints().unwrap();
        assert_eq!(endpoints.rpc_url, "https://rpc.example.test");
        assert_eq!(endpoints.websocket_url, "wss://api.mainnet-beta.solana.com");
        assert_eq!(endpoints.helius_api_key.as_deref(), Some("helius"));
        assert!(!solana.telegram_configured());
        for sub in DATA_SUBDIRS {
            assert!(dir.path().join("data/solana").join(sub).is_dir());
        }
        assert!(solana.validate().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_commitment_fails_schema_but_not_init() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.path().join("config")),
                env(&[("SOL_TOOLS_SOLANA__COMMITMENT", "eventually")]),
            )
            .unwrap(),
        );
        let solana = SolanaAdapter::new(
            registry.clone(),
            AdapterOptions::test().with_data_dir(dir.path().join("data")),
        );
        assert!(solana.initialize().await.unwrap());
        assert!(!registry.validate_module_config("solana"));
        assert_eq!(registry.validation_errors("solana").len(), 1);
    }

    #[test]
    fn test_validate_address() {
        assert!(SolanaAdapter::validate_address(&"So1".repeat(15)[..44]));
        assert!(!SolanaAdapter::validate_address(""));
    }
}
