//! 分层配置注册表
//!
//! 加载顺序（低 → 高）：内置默认值、JSON 配置文件、`SOL_TOOLS_` 环境变量。

use super::defaults::{self, CONFIG_VERSION_KEY, ENV_NESTING_SEPARATOR, ENV_PREFIX};
use super::schema::ConfigSchema;
use crate::errors::ConfigError;
use dashmap::DashMap;
use parking_lot::RwLock;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub type ConfigMap = Map<String, Value>;

/// 注册表构造参数
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// 测试模式下读取 `test_config.json`
    pub test_mode: bool,
    pub config_dir: Option<PathBuf>,
    /// 显式指定的 `.env` 文件
    pub env_file: Option<PathBuf>,
}

impl RegistryOptions {
    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }
}

/// 配置路径：点号分隔的字符串或键列表
pub trait ConfigPath {
    fn segments(&self) -> Vec<String>;
}

impl ConfigPath for &str {
    fn segments(&self) -> Vec<String> {
        self.split('.').map(str::to_string).collect()
    }
}

impl ConfigPath for String {
    fn segments(&self) -> Vec<String> {
        self.as_str().segments()
    }
}

impl ConfigPath for &[&str] {
    fn segments(&self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> ConfigPath for [&str; N] {
    fn segments(&self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl ConfigPath for Vec<String> {
    fn segments(&self) -> Vec<String> {
        self.clone()
    }
}

pub struct ConfigRegistry {
    test_mode: bool,
    config_dir: PathBuf,
    config_path: PathBuf,
    env: HashMap<String, String>,
    config: RwLock<Value>,
    module_configs: DashMap<String, ConfigMap>,
    schemas: DashMap<String, ConfigSchema>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("test_mode", &self.test_mode)
            .field("config_path", &self.config_path)
            .field("cached_modules", &self.module_configs.len())
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

impl ConfigRegistry {
    /// 从进程环境构造，先加载 `.env`
    pub fn new(options: RegistryOptions) -> Result<Self, ConfigError> {
        match &options.env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    ConfigError::EnvFile(path.display().to_string(), e.to_string())
                })?;
            }
            None => {
                if let Ok(path) = dotenvy::from_filename(defaults::ENV_FILE_NAME) {
                    tracing::debug!(path = %path.display(), "Loaded environment file");
                }
            }
        }
        Self::from_sources(options, std::env::vars())
    }

    /// 使用给定的环境变量集合构造，不读取进程环境
    pub fn from_sources<I>(options: RegistryOptions, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_dir = options
            .config_dir
            .clone()
            .unwrap_or_else(defaults::default_config_dir);
        let file_name = if options.test_mode {
            defaults::TEST_CONFIG_FILE_NAME
        } else {
            defaults::CONFIG_FILE_NAME
        };
        let config_path = config_dir.join(file_name);

        let mut registry = Self {
            test_mode: options.test_mode,
            config_dir,
            config_path,
            env: env.into_iter().collect(),
            config: RwLock::new(Value::Object(ConfigMap::new())),
            module_configs: DashMap::new(),
            schemas: DashMap::new(),
        };
        let loaded = registry.load_layers()?;
        *registry.config.get_mut() = loaded;

        tracing::debug!(
            path = %registry.config_path.display(),
            test_mode = registry.test_mode,
            "Configuration registry loaded"
        );
        Ok(registry)
    }

    fn load_layers(&self) -> Result<Value, ConfigError> {
        let mut config = defaults::default_config();

        if self.config_path.exists() {
            let display = self.config_path.display().to_string();
            let content = fs::read_to_string(&self.config_path)
                .map_err(|e| ConfigError::FileRead(display.clone(), e))?;
            let file_config: Value = serde_json::from_str(&content)
                .map_err(|e| ConfigError::JsonParse(display.clone(), e))?;
            if !file_config.is_object() {
                return Err(ConfigError::NotAnObject { path: display });
            }
            deep_merge(&mut config, file_config);
        }

        apply_env_overrides(&mut config, &self.env);
        Ok(config)
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file_path(&self) -> &Path {
        &self.config_path
    }

    /// 当前完整配置的副本
    pub fn snapshot(&self) -> Value {
        self.config.read().clone()
    }

    /// 数据根目录
    pub fn data_dir(&self) -> PathBuf {
        self.config
            .read()
            .get("data_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// 读取构造时捕获的环境变量，空值视为未设置
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    /// 获取模块配置，非空结果会被缓存
    pub fn get_module_config(&self, module: &str) -> ConfigMap {
        if let Some(cached) = self.module_configs.get(module) {
            return cached.clone();
        }

        let section = self
            .config
            .read()
            .get(module)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if !section.is_empty() {
            self.module_configs
                .insert(module.to_string(), section.clone());
        }
        section
    }

    pub fn register_schema(&self, module: &str, schema: ConfigSchema) -> Result<(), ConfigError> {
        schema.compile(module)?;
        tracing::debug!(module, version = %schema.version, "Registered config schema");
        self.schemas.insert(module.to_string(), schema);
        Ok(())
    }

    /// 没有注册 schema 的模块视为有效
    pub fn validate_module_config(&self, module: &str) -> bool {
        let errors = self.validation_errors(module);
        for error in &errors {
            tracing::warn!(module, %error, "Module configuration is invalid");
        }
        errors.is_empty()
    }

    pub fn validation_errors(&self, module: &str) -> Vec<String> {
        let Some(schema) = self.schemas.get(module).map(|s| s.value().clone()) else {
            return Vec::new();
        };
        let validator = match schema.compile(module) {
            Ok(validator) => validator,
            Err(e) => return vec![e.to_string()],
        };
        let instance = Value::Object(self.get_module_config(module));
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        errors
    }

    /// 执行 schema 中尚未应用的迁移，返回迁移后的版本
    pub fn migrate_module_config(&self, module: &str) -> Result<Option<Version>, ConfigError> {
        let Some(schema) = self.schemas.get(module).map(|s| s.value().clone()) else {
            return Ok(None);
        };

        let mut section = self.get_module_config(module);
        let current = match section.get(CONFIG_VERSION_KEY).and_then(Value::as_str) {
            Some(raw) => Version::parse(raw).map_err(|source| ConfigError::InvalidVersion {
                module: module.to_string(),
                version: raw.to_string(),
                source,
            })?,
            None => Version::new(0, 0, 0),
        };
        if current >= schema.version {
            return Ok(None);
        }

        for (target, migration) in schema.pending_migrations(&current) {
            migration(&mut section).map_err(|reason| ConfigError::Migration {
                module: module.to_string(),
                version: target.to_string(),
                reason,
            })?;
            tracing::info!(module, from = %current, to = %target, "Applied config migration");
        }
        section.insert(
            CONFIG_VERSION_KEY.to_string(),
            Value::String(schema.version.to_string()),
        );

        self.config
            .write()
            .as_object_mut()
            .ok_or_else(|| ConfigError::NotAnObject {
                path: String::new(),
            })?
            .insert(module.to_string(), Value::Object(section));
        self.module_configs.remove(module);

        Ok(Some(schema.version))
    }

    /// 按路径读取配置，缺失时返回默认值
    pub fn get_config_value<P, D>(&self, path: P, default: D) -> Value
    where
        P: ConfigPath,
        D: Into<Value>,
    {
        let segments = path.segments();
        let config = self.config.read();
        lookup(&config, &segments)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    /// 按路径读取并反序列化
    pub fn get_as<T, P>(&self, path: P) -> Option<T>
    where
        T: DeserializeOwned,
        P: ConfigPath,
    {
        let segments = path.segments();
        let config = self.config.read();
        lookup(&config, &segments).and_then(|value| T::deserialize(value).ok())
    }

    /// 按路径写入配置，中间节点不存在或不是对象时会被替换为对象
    pub fn set_config_value<P, V>(&self, path: P, value: V, save: bool) -> Result<(), ConfigError>
    where
        P: ConfigPath,
        V: Into<Value>,
    {
        let segments = path.segments();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidPath(segments.join(".")));
        }

        {
            let mut config = self.config.write();
            let mut current = &mut *config;
            for segment in &segments[..segments.len() - 1] {
                current = child_object(current, segment);
            }
            let last = &segments[segments.len() - 1];
            if !current.is_object() {
                *current = Value::Object(ConfigMap::new());
            }
            if let Value::Object(map) = current {
                map.insert(last.clone(), value.into());
            }
        }
        self.module_configs.remove(&segments[0]);

        if save {
            self.save_config()?;
        }
        Ok(())
    }

    /// 以 4 空格缩进写回配置文件
    pub fn save_config(&self) -> Result<(), ConfigError> {
        let display = self.config_path.display().to_string();
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| ConfigError::FileWrite(display.clone(), e))?;

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.config
            .read()
            .serialize(&mut serializer)
            .map_err(|e| ConfigError::JsonParse(display.clone(), e))?;

        fs::write(&self.config_path, buffer).map_err(|e| ConfigError::FileWrite(display, e))?;
        tracing::info!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }

    /// 重新加载所有配置层并清空模块缓存
    pub fn reload_config(&self) -> Result<(), ConfigError> {
        let loaded = self.load_layers()?;
        *self.config.write() = loaded;
        self.module_configs.clear();
        tracing::debug!("Configuration reloaded");
        Ok(())
    }

    /// 检查模块所需的环境变量
    pub fn check_required_env_vars(&self, module: &str) -> BTreeMap<String, bool> {
        let vars: Vec<String> = match self.schemas.get(module) {
            Some(schema) if !schema.required_env_vars.is_empty() => {
                schema.required_env_vars.clone()
            }
            _ => defaults::required_env_vars(module)
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        vars.into_iter()
            .map(|var| {
                let present = self.env_var(&var).is_some();
                (var, present)
            })
            .collect()
    }
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| current.as_object()?.get(segment))
}

fn child_object<'a>(parent: &'a mut Value, key: &str) -> &'a mut Value {
    if !parent.is_object() {
        *parent = Value::Object(ConfigMap::new());
    }
    let child = &mut parent[key];
    if !child.is_object() {
        *child = Value::Object(ConfigMap::new());
    }
    child
}

/// 深度合并：对象递归合并，其余值直接覆盖
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// 把 `SOL_TOOLS_` 前缀的环境变量写入配置树
pub fn apply_env_overrides(config: &mut Value, env: &HashMap<String, String>) {
    let mut keys: Vec<&String> = env.keys().filter(|k| k.starts_with(ENV_PREFIX)).collect();
    // 保证覆盖顺序稳定
    keys.sort();

    for key in keys {
        let stripped = key[ENV_PREFIX.len()..].to_lowercase();
        let segments: Vec<String> = stripped
            .split(ENV_NESTING_SEPARATOR)
            .map(str::to_string)
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            tracing::warn!(variable = %key, "Ignoring malformed config override");
            continue;
        }

        let mut current = &mut *config;
        for segment in &segments[..segments.len() - 1] {
            current = child_object(current, segment);
        }
        if let Value::Object(map) = current {
            map.insert(segments[segments.len() - 1].clone(), coerce_env_value(&env[key]));
        }
    }
}

/// 环境变量值的类型推断：bool、整数、浮点数，否则保留字符串
pub fn coerce_env_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<u64>() {
            return Value::Number(n.into());
        }
        // 超出 u64 的整数退化为浮点数
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    if raw.matches('.').count() == 1 {
        let digits = raw.replacen('.', "", 1);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}
