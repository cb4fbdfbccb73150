pub mod adapters;
pub mod args;
pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use adapters::{Adapter, AdapterManager, AdapterState};
pub use config::{ConfigRegistry, RegistryOptions};
pub use errors::{AdapterError, AppError, ConfigError};
pub use infrastructure::container::{ContainerError, DiContainer, Lifecycle};
