//! GMGN 行情适配器

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
use std::collections::BTreeMap;
use std::sync::Arc;

/// 可选凭证，只影响部分数据源
pub const OPTIONAL_CREDENTIALS: &[&str] = &["PUMPFUN_API_KEY", "MOONSHOT_API_KEY"];
const DATA_SUBDIRS: &[&str] = &["token-listings", "market-cap-data", "token-info"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmgnSettings {
    pub base_url: String,
    pub client_id: String,
    pub app_ver: String,
    pub tz_name: String,
    pub tz_offset: String,
    pub app_lang: String,
    /// 行情请求的时间窗口（秒）
    pub batch_window_secs: u64,
}

impl Default for GmgnSettings {
    fn default() -> Self {
        Self {
            base_url: "https://gmgn.mobi/defi/quotation/v1/tokens/mcapkline/sol/".to_string(),
            client_id: "gmgn_web_2025.0214.180010".to_string(),
            app_ver: "2025.0214.180010".to_string(),
            tz_name: "Europe/Berlin".to_string(),
            tz_offset: "3600".to_string(),
            app_lang: "\"en-US\"".to_string(),
            batch_window_secs: 3600,
        }
    }
}

impl GmgnSettings {
    /// 请求附带的查询参数
    pub fn client_params(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("client_id", self.client_id.clone()),
            ("app_ver", self.app_ver.clone()),
            ("tz_name", self.tz_name.clone()),
            ("tz_offset", self.tz_offset.clone()),
            ("app_lang", self.app_lang.clone()),
        ])
    }
}

fn config_schema() -> ConfigSchema {
    ConfigSchema::new(
        json!({
            "type": "object",
            "properties": {
                "base_url": {"type": "string", "minLength": 1},
                "client_id": {"type": "string"},
                "batch_window_secs": {"type": "integer", "minimum": 1}
            }
        }),
        Version::new(1, 0, 0),
    )
    .with_required_env_vars(OPTIONAL_CREDENTIALS.iter().copied())
}

pub struct GmgnAdapter {
    core: AdapterCore,
    settings: RwLock<Option<GmgnSettings>>,
    credentials: RwLock<BTreeMap<String, String>>,
}

impl GmgnAdapter {
    pub fn new(registry: Arc<ConfigRegistry>, options: AdapterOptions) -> Self {
        Self {
            core: AdapterCore::for_type::<Self>(registry, options),
            settings: RwLock::new(None),
            credentials: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn settings(&self) -> Option<GmgnSettings> {
        self.settings.read().clone()
    }

    /// 已配置的可选凭证名
    pub fn configured_credentials(&self) -> Vec<String> {
        self.credentials.read().keys().cloned().collect()
    }

    /// 某个代币的行情地址
    pub fn token_url(&self, token_address: &str) -> Result<String, AdapterError> {
        let settings = self.settings().ok_or_else(|| {
            AdapterError::Operation("gmgn adapter is not initialized".to_string())
        })?;
        let address = token_address.trim();
        if address.is_empty() {
            return Err(AdapterError::Validation("token address is empty".to_string()));
        }
        Ok(format!("{}{}", settings.base_url, address))
    }
}

impl Injectable for GmgnAdapter {
    fn dependencies() -> DependencyMap {
        DependencyMap::new().with_dependency::<ConfigRegistry>("config_registry")
    }

    fn construct(ctx: &InjectionContext<'_>) -> Result<Self, ContainerError> {
        let registry = ctx.get::<ConfigRegistry>("config_registry")?;
        Ok(Self::new(registry, AdapterOptions::from_context(ctx)))
    }
}

#[async_trait]
impl Adapter for GmgnAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AdapterCore {
        &mut self.core
    }

    async fn initialize(&self) -> Result<bool, AdapterError> {
        self.core.set_state(AdapterState::Initializing, None)?;
        self.core.install_schema(config_schema())?;

        let settings: GmgnSettings = self.core.settings()?;
        let mut credentials = BTreeMap::new();
        for name in OPTIONAL_CREDENTIALS {
            if let Some(value) = self.core.credential(name, false)? {
                credentials.insert(name.to_string(), value);
            }
        }
        self.core.prepare_data_dirs(DATA_SUBDIRS)?;

        *self.settings.write() = Some(settings);
        *self.credentials.write() = credentials;
        self.core.set_state(AdapterState::Ready, None)?;
        Ok(true)
    }

    async fn validate(&self) -> Result<bool, AdapterError> {
        if !self.core.is_ready() {
            return Ok(false);
        }
        Ok(self.settings().is_some_and(|settings| {
            settings.base_url.starts_with("http") && settings.batch_window_secs > 0
        }))
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        if !self.core.begin_cleanup()? {
            return Ok(());
        }
        self.settings.write().take();
        self.credentials.write().clear();
        self.core.set_state(AdapterState::CleanedUp, None)
    }
}
