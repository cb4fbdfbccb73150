use crate::adapters::AdapterState;
use crate::infrastructure::container::ContainerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("Application error: {0}")]
    Generic(String),
}

/// 适配器生命周期中的错误
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter configuration error: {0}")]
    Config(String),
    #[error("Adapter initialization failed: {0}")]
    Initialization(String),
    #[error("Adapter validation failed: {0}")]
    Validation(String),
    #[error("Adapter operation failed: {0}")]
    Operation(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Illegal state transition for '{module}': {from} -> {to}")]
    IllegalTransition {
        module: String,
        from: AdapterState,
        to: AdapterState,
    },
}

impl AdapterError {
    /// 生命周期守卫需要把错误同时记录到适配器和返回给调用方
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Config(msg) => Self::Config(msg.clone()),
            Self::Initialization(msg) => Self::Initialization(msg.clone()),
            Self::Validation(msg) => Self::Validation(msg.clone()),
            Self::Operation(msg) => Self::Operation(msg.clone()),
            Self::ResourceNotFound(msg) => Self::ResourceNotFound(msg.clone()),
            Self::IllegalTransition { module, from, to } => Self::IllegalTransition {
                module: module.clone(),
                from: *from,
                to: *to,
            },
        }
    }
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        AdapterError::Config(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to write configuration file '{0}': {1}")]
    FileWrite(String, #[source] std::io::Error),
    #[error("Failed to parse configuration file '{0}': {1}")]
    JsonParse(String, #[source] serde_json::Error),
    #[error("Failed to load environment file '{0}': {1}")]
    EnvFile(String, String),
    #[error("Invalid configuration path '{0}'")]
    InvalidPath(String),
    #[error("Configuration value at '{path}' is not an object")]
    NotAnObject { path: String },
    #[error("Invalid schema for module '{module}': {reason}")]
    InvalidSchema { module: String, reason: String },
    #[error("Invalid config version '{version}' for module '{module}': {source}")]
    InvalidVersion {
        module: String,
        version: String,
        #[source]
        source: semver::Error,
    },
    #[error("Migration of module '{module}' to {version} failed: {reason}")]
    Migration {
        module: String,
        version: String,
        reason: String,
    },
    #[error("Failed to deserialize settings for module '{module}': {source}")]
    Settings {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}
