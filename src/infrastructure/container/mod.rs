//! 依赖注入容器
//!
//! 支持：
//! - 单例 / 瞬态 / 作用域生命周期（作用域当前等同于瞬态）
//! - 实例、类型、工厂、mock 注册
//! - 显式依赖声明与循环依赖检测
//! - 测试模式下的自动 mock

pub mod context;
pub mod di;
pub mod global;
pub mod registration;

pub use context::{DependencyMap, DependencySpec, Injectable, InjectionContext};
pub use di::{ContainerStats, DiContainer, TestMode};
pub use global::{configure_global_container, global_container, reset_global_container};
pub use registration::DependencyRegistration;

use thiserror::Error;

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// 首次解析时创建，之后共享同一实例
    Singleton,
    /// 每次解析都创建新实例
    Transient,
    /// 保留给作用域容器，目前与瞬态一致
    Scoped,
}

impl Lifecycle {
    pub fn is_shared(self) -> bool {
        matches!(self, Lifecycle::Singleton)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::Singleton => "singleton",
            Lifecycle::Transient => "transient",
            Lifecycle::Scoped => "scoped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Dependency '{type_name}' is not registered")]
    DependencyNotFound { type_name: String },

    #[error("Failed to resolve dependency '{dependency}' of '{service}': {source}")]
    DependencyResolution {
        service: String,
        dependency: String,
        #[source]
        source: Box<ContainerError>,
    },

    #[error("Invalid registration for '{type_name}': {reason}")]
    InvalidRegistration { type_name: String, reason: String },

    #[error("Type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("Failed to create '{type_name}': {reason}")]
    CreationFailed { type_name: String, reason: String },

    #[error("Dependency '{dependency}' was not provided to '{service}'")]
    MissingDependency { service: String, dependency: String },
}

impl ContainerError {
    /// 解析链中最内层的错误
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            ContainerError::DependencyResolution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// 去掉模块路径的类型名：`sol_tools::adapters::dragon::DragonAdapter` → `DragonAdapter`
pub fn short_type_name<T: ?Sized>() -> String {
    shorten_type_path(std::any::type_name::<T>())
}

pub(crate) fn shorten_type_path(full: &str) -> String {
    let mut result = String::with_capacity(full.len());
    let mut token = String::new();

    let flush = |token: &mut String, result: &mut String| {
        if !token.is_empty() {
            result.push_str(token.rsplit("::").next().unwrap_or_default());
            token.clear();
        }
    };

    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            token.push(ch);
        } else {
            flush(&mut token, &mut result);
            result.push(ch);
        }
    }
    flush(&mut token, &mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DatabaseService;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<DatabaseService>(), "DatabaseService");
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(
            shorten_type_path("alloc::sync::Arc<dyn sol_tools::adapters::base::Adapter>"),
            "Arc<dyn Adapter>"
        );
    }

    #[test]
    fn test_circular_dependency_message() {
        let err = ContainerError::CircularDependency {
            chain: vec!["A".into(), "B".into(), "C".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> C -> A");
    }

    #[test]
    fn test_root_cause_unwraps_resolution_chain() {
        let err = ContainerError::DependencyResolution {
            service: "DragonAdapter".into(),
            dependency: "gmgn".into(),
            source: Box::new(ContainerError::DependencyNotFound {
                type_name: "GmgnAdapter".into(),
            }),
        };
        assert!(matches!(
            err.root_cause(),
            ContainerError::DependencyNotFound { .. }
        ));
    }
}
