use anyhow::{anyhow, Context};
use clap::Parser;
use serde_json::{json, Value};
use sol_tools::adapters::{self, AdapterManager};
use sol_tools::args::{Args, Command, ConfigAction};
use sol_tools::config::{self, defaults, registry::coerce_env_value, ConfigRegistry, RegistryOptions};
use sol_tools::errors::AppError;
use sol_tools::infrastructure::container::configure_global_container;
use sol_tools::logging::{init_logging, LoggingConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logging = if args.test_mode {
        LoggingConfig::testing()
    } else {
        LoggingConfig::default()
    }
    .with_overrides(args.log_format, args.verbose);
    if let Some(path) = &args.log_file {
        logging = logging.with_file_output(path);
    }
    init_logging(&logging).map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    let options = RegistryOptions {
        test_mode: args.test_mode,
        config_dir: args.config_dir.clone(),
        env_file: args.env_file.clone(),
    };
    let registry = config::install_global_registry(Arc::new(
        ConfigRegistry::new(options).context("failed to load configuration")?,
    ));

    let output = match args.command {
        Command::Status => handle_status(registry, args.test_mode, args.verbose).await?,
        Command::Env { module } => handle_env(&registry, module.as_deref())?,
        Command::Config { action } => handle_config(&registry, action)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// 完整跑一遍生命周期，输出每个适配器的状态
async fn handle_status(
    registry: Arc<ConfigRegistry>,
    test_mode: bool,
    verbose: bool,
) -> Result<Value, AppError> {
    let container = configure_global_container(test_mode, None);
    container.set_verbose(verbose);
    container.register_instance(registry)?;
    adapters::register_all(&container)?;

    let manager = AdapterManager::from_container(&container)?;
    let initialized = manager.initialize_all().await;
    let validated = manager.validate_all().await;
    let statuses = manager.statuses();
    let cleaned = manager.cleanup_all().await;

    tracing::info!(stats = %container.stats().summary(), "Container statistics");
    Ok(json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "test_mode": test_mode,
        "adapters": statuses,
        "initialize": initialized,
        "validate": validated,
        "cleanup": cleaned,
    }))
}

fn handle_env(registry: &ConfigRegistry, module: Option<&str>) -> Result<Value, AppError> {
    let modules: Vec<&str> = match module {
        Some(module) if defaults::KNOWN_MODULES.contains(&module) => vec![module],
        Some(module) => return Err(AppError::Generic(format!("unknown module '{module}'"))),
        None => defaults::KNOWN_MODULES.to_vec(),
    };
    let report: serde_json::Map<String, Value> = modules
        .into_iter()
        .map(|module| (module.to_string(), json!(registry.check_required_env_vars(module))))
        .collect();
    Ok(Value::Object(report))
}

fn handle_config(registry: &ConfigRegistry, action: ConfigAction) -> Result<Value, AppError> {
    match action {
        ConfigAction::Get { path } => Ok(registry.get_config_value(path.as_str(), Value::Null)),
        ConfigAction::Set { path, value, no_save } => {
            let value = coerce_env_value(&value);
            registry.set_config_value(path.as_str(), value.clone(), !no_save)?;
            Ok(json!({ "path": path, "value": value, "saved": !no_save }))
        }
        ConfigAction::Show => Ok(registry.snapshot()),
    }
}
