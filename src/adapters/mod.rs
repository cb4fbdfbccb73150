//! 适配器：每个外部工具集对应一个模块
//!
//! 所有适配器共享同一套生命周期（见 [`AdapterState`]），通过 [`AdapterCore`]
//! 访问配置注册表与数据目录。

pub mod base;
pub mod dragon;
pub mod dune;
pub mod ethereum;
pub mod gmgn;
pub mod manager;
pub mod sharp;
pub mod solana;
pub mod state;

pub use base::{
    enforce_container_settings, module_name_from_type_name, Adapter, AdapterCore, AdapterOptions,
    AdapterStatus,
};
pub use dragon::DragonAdapter;
pub use dune::DuneAdapter;
pub use ethereum::EthereumAdapter;
pub use gmgn::GmgnAdapter;
pub use manager::{cleanup_adapter, initialize_adapter, validate_adapter, AdapterManager, LifecycleReport};
pub use sharp::SharpAdapter;
pub use solana::SolanaAdapter;
pub use state::AdapterState;

use crate::infrastructure::container::{ContainerError, DiContainer, Lifecycle};

/// 把内置适配器注册为单例
///
/// 调用方需要事先注册 `ConfigRegistry` 实例。
pub fn register_all(container: &DiContainer) -> Result<(), ContainerError> {
    container.register_adapter::<GmgnAdapter>(Lifecycle::Singleton, None)?;
    container.register_adapter::<DragonAdapter>(Lifecycle::Singleton, None)?;
    container.register_adapter::<SolanaAdapter>(Lifecycle::Singleton, None)?;
    container.register_adapter::<EthereumAdapter>(Lifecycle::Singleton, None)?;
    container.register_adapter::<SharpAdapter>(Lifecycle::Singleton, None)?;
    container.register_adapter::<DuneAdapter>(Lifecycle::Singleton, None)?;
    tracing::debug!("Registered built-in adapters");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigRegistry, RegistryOptions};
    use std::sync::Arc;

    #[test]
    fn test_register_all_shares_gmgn_singleton() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConfigRegistry::from_sources(
            RegistryOptions::test().with_config_dir(dir.path().join("config")),
            Vec::new(),
        )
        .unwrap();
        registry
            .set_config_value("data_dir", dir.path().join("data").to_string_lossy().into_owned(), false)
            .unwrap();

        let container = DiContainer::new(true, None);
        container.register_instance(Arc::new(registry)).unwrap();
        register_all(&container).unwrap();

        let dragon = container.resolve::<DragonAdapter>().unwrap();
        let gmgn = container.resolve::<GmgnAdapter>().unwrap();
        assert!(Arc::ptr_eq(dragon.gmgn(), &gmgn));
        assert!(dragon.core().test_mode());
        assert!(tokio_test::block_on(gmgn.initialize()).unwrap());
        assert!(dir.path().join("data/gmgn/token-info").is_dir());

        let modules: Vec<String> = container
            .resolve_all::<dyn Adapter>()
            .unwrap()
            .iter()
            .map(|adapter| adapter.module_name().to_string())
            .collect();
        assert_eq!(modules, vec!["gmgn", "dragon", "solana", "ethereum", "sharp", "dune"]);
    }
}
