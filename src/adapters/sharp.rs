//! Sharp 钱包工具适配器
//!
//! 不需要凭证，只管理钱包列表与 CSV 的目录布局和筛选阈值。

use super::base::{Adapter, AdapterCore, AdapterOptions};
use super::state::AdapterState;
use crate::config::{ConfigMap, ConfigRegistry, ConfigSchema};
use crate::errors::AdapterError;
use crate::infrastructure::container::{ContainerError, DependencyMap, Injectable, InjectionContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const DATA_SUBDIRS: &[&str] = &[
    "wallets",
    "wallets/split",
    "csv/unmerged",
    "csv/merged",
    "csv/unfiltered",
    "csv/filtered",
    "config",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletFilters {
    pub min_sol_balance: f64,
    pub min_winrate_7d: f64,
    pub min_winrate_30d: f64,
    pub min_realized_pnl_7d: f64,
    pub min_realized_pnl_30d: f64,
    pub min_tokens_traded: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletCheckerSettings {
    pub filters: WalletFilters,
    pub save_unfiltered_csv: bool,
    pub save_filtered_csv: bool,
}

impl Default for WalletCheckerSettings {
    fn default() -> Self {
        Self {
            filters: WalletFilters::default(),
            save_unfiltered_csv: true,
            save_filtered_csv: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnlCheckerSettings {
    pub min_pnl: f64,
    pub min_win_rate: f64,
    pub max_loss_rate: f64,
    pub min_trades: u32,
    pub missed_data_allowed: bool,
}

impl Default for PnlCheckerSettings {
    fn default() -> Self {
        Self {
            min_pnl: 0.0,
            min_win_rate: 0.0,
            max_loss_rate: 100.0,
            min_trades: 0,
            missed_data_allowed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpSettings {
    pub bullx_api_url: String,
    /// 拆分钱包列表时每个文件的上限
    pub max_wallets_per_file: usize,
    pub wallet_checker: WalletCheckerSettings,
    pub pnl_checker: PnlCheckerSettings,
}

impl Default for SharpSettings {
    fn default() -> Self {
        Self {
            bullx_api_url: "https://api-neo.bullx.io/v2/api/getPortfolioV3".to_string(),
            max_wallets_per_file: 24999,
            wallet_checker: WalletCheckerSettings::default(),
            pnl_checker: PnlCheckerSettings::default(),
        }
    }
}

/// 1.1.0 起筛选阈值移入 `wallet_checker.filters`
fn migrate_flat_filters(config: &mut ConfigMap) -> Result<(), String> {
    let Some(filters) = config.remove("filters") else {
        return Ok(());
    };
    if !filters.is_object() {
        return Err("'filters' must be an object".to_string());
    }
    let checker = config
        .entry("wallet_checker")
        .or_insert_with(|| Value::Object(ConfigMap::new()));
    match checker {
        Value::Object(checker) => {
            checker.entry("filters").or_insert(filters);
            Ok(())
        }
        _ => Err("'wallet_checker' must be an object".to_string()),
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "bullx_api_url": {"type": "string", "minLength": 1},
                "max_wallets_per_file": {"type": "integer", "minimum": 1},
                "wallet_checker": {"type": "object"},
                "pnl_checker": {
                    "type": "object",
                    "properties": {
                        "max_loss_rate": {"type": "number", "minimum": 0, "maximum": 100}
                    }
                }
            }
        }),
        Version::new(1, 1, 0),
    )
    .with_migration(Version::new(1, 1, 0), migrate_flat_filters)
}

pub struct SharpAdapter {
    core: AdapterCore,
    settings: RwLock<Option<SharpSettings>>,
}

impl SharpAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            settings: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> Option<SharpSettings> {
        self.settings.read().clone()
    }
}

impl Injectable for SharpAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new().with_dependency::<ConfigRegistry>("config_registry")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        Ok(Self::new(registry, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for SharpAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let settings: SharpSettings = self.core.settings()?;
        self.core.prepare_data_dirs(DATA_SUBDIRS)?;

        *self.settings.write() = Some(settings);
        self.core.set_state(AdapterState::Ready, None)?;
        Ok(true)
    }

    async fn validate(&self) -> Result<bool, AdapterError> {
        if !self.core.is_ready() {
            return Ok(false);
        }
        Ok(self.settings().is_some_and(|settings| {
            settings.max_wallets_per_file > 0
                && (0.0..=100.0).contains(&settings.pnl_checker.max_loss_rate)
        }))
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        if !self.core.begin_cleanup()? {
            return Ok(());
        }
        self.settings.write().take();
        self.core.set_state(AdapterState::CleanedUp, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryOptions;

    fn registry(dir: &std::path::Path) -> Arc<ConfigRegistry> {
        Arc::new(
            ConfigRegistry::from_sources(
                RegistryOptions::test().with_config_dir(dir.join("config")),
                Vec::new(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_initialize_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sharp = SharpAdapter::new(
            registry(dir.path()),
            AdapterOptions::test().with_data_dir(dir.path().join("data")),
        );
        assert!(sharp.initialize().await.unwrap());
        for sub in DATA_SUBDIRS {
            assert!(dir.path().join("data/sharp").join(sub).is_dir(), "{sub}");
        }
        let settings = sharp.settings().unwrap();
        assert_eq!(settings.max_wallets_per_file, 24999);
        assert_eq!(settings.pnl_checker.max_loss_rate, 100.0);
        assert!(settings.wallet_checker.save_filtered_csv);
        assert!(sharp.validate().await.unwrap());
    }

    #[tokio::test]
    async fn test_flat_filters_are_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry
            .set_config_value(
                "sharp",
                json!({"config_version": "1.0.0", "filters": {"min_sol_balance": 2.5}}),
                false,
            )
            .unwrap();

        let sharp = SharpAdapter::new(
            registry.clone(),
            AdapterOptions::test().with_data_dir(dir.path().join("data")),
        );
        sharp.initialize().await.unwrap();

        let settings = sharp.settings().unwrap();
        assert_eq!(settings.wallet_checker.filters.min_sol_balance, 2.5);
        let stored = registry.get_module_config("sharp");
        assert!(stored.get("filters").is_none());
        assert_eq!(stored["config_version"], json!("1.1.0"));
    }
}
