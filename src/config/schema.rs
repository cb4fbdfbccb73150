//! 模块配置 schema 与版本迁移

use super::registry::ConfigMap;
use crate::errors::ConfigError;
use semver::Version;
use serde_json::Value;
use std::collections::BTreeMap;

/// 迁移函数：就地修改模块配置
pub type MigrationFn = fn(&mut ConfigMap) -> Result<(), String>;

/// 模块配置的校验规则
///
/// `migrations` 以目标版本为键，按版本升序执行。
#[derive(Clone)]
pub struct ConfigSchema {
    pub schema: Value,
    pub version: Version,
    pub migrations: BTreeMap<Version, MigrationFn>,
    pub required_env_vars: Vec<String>,
}

impl ConfigSchema {
    pub fn new(schema: Value, version: Version) -> Self {
        Self {
            schema,
            version,
            migrations: BTreeMap::new(),
            required_env_vars: Vec::new(),
        }
    }

    pub fn with_migration(mut self, target: Version, migration: MigrationFn) -> Self {
        self.migrations.insert(target, migration);
        self
    }

    pub fn with_required_env_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_env_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    /// 编译 schema，注册时用来尽早发现错误
    pub(crate) fn compile(&self, module: &str) -> Result<jsonschema::Validator, ConfigError> {
        jsonschema::validator_for(&self.schema).map_err(|e| ConfigError::InvalidSchema {
            module: module.to_string(),
            reason: e.to_string(),
        })
    }

    /// 返回 `(current, target]` 区间内的迁移
    pub(crate) fn pending_migrations(&self, current: &Version) -> Vec<(Version, MigrationFn)> {
        self.migrations
            .iter()
            .filter(|(target, _)| *target > current && **target <= self.version)
            .map(|(target, migration)| (target.clone(), *migration))
            .collect()
    }
}

impl std::fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("version", &self.version.to_string())
            .field("migrations", &self.migrations.keys().map(ToString::to_string).collect::<Vec<_>>())
            .field("required_env_vars", &self.required_env_vars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(_: &mut ConfigMap) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn test_pending_migrations_window() {
        let schema = ConfigSchema::new(json!({"type": "object"}), Version::new(2, 0, 0))
            .with_migration(Version::new(1, 0, 0), noop)
            .with_migration(Version::new(1, 5, 0), noop)
            .with_migration(Version::new(2, 0, 0), noop)
            .with_migration(Version::new(3, 0, 0), noop);

        let pending: Vec<String> = schema
            .pending_migrations(&Version::new(1, 0, 0))
            .into_iter()
            .map(|(v, _)| v.to_string())
            .collect();
        assert_eq!(pending, vec!["1.5.0", "2.0.0"]);
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let schema = ConfigSchema::new(json!({"type": 12}), Version::new(1, 0, 0));
        assert!(matches!(
            schema.compile("dragon"),
            Err(ConfigError::InvalidSchema { .. })
        ));
    }
}
