use serde_json::{json, Value};
use std::path::PathBuf;

/// 环境变量覆盖前缀
pub const ENV_PREFIX: &str = "SOL_TOOLS_";
/// 环境变量中的嵌套分隔符
pub const ENV_NESTING_SEPARATOR: &str = "__";

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const TEST_CONFIG_FILE_NAME: &str = "test_config.json";
pub const ENV_FILE_NAME: &str = ".env";

/// 模块配置中记录迁移版本的键
pub const CONFIG_VERSION_KEY: &str = "config_version";

const LOCAL_CONFIG_DIR: &str = "config";
const APP_DIR_NAME: &str = "sol-tools";

/// 内置默认配置，优先级最低
pub fn default_config() -> Value {
    json!({
        "proxy_enabled": false,
        "proxy_file": "data/input-data/proxies/proxies.txt",
        "data_dir": "data",
        "input_data_dir": "data/input-data",
        "output_data_dir": "data/output-data",
        "cache_dir": "data/cache",
        "theme": "dark"
    })
}

/// 各模块需要的环境变量
pub fn required_env_vars(module: &str) -> &'static [&'static str] {
    match module {
        "dragon" => &["SOLSCAN_API_KEY", "ETHERSCAN_API_KEY"],
        "dune" => &["DUNE_API_KEY"],
        "solana" => &["HELIUS_API_KEY", "SOLANA_RPC_URL", "SOLANA_WEBSOCKET_URL"],
        "ethereum" => &["ETHEREUM_RPC_URL", "ETHERSCAN_API_KEY"],
        "gmgn" => &["PUMPFUN_API_KEY", "MOONSHOT_API_KEY"],
        "telegram" => &["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"],
        "bullx" => &["BULLX_API_KEY"],
        _ => &[],
    }
}

/// 已知模块列表，用于 `env` 命令的总览
pub const KNOWN_MODULES: &[&str] = &[
    "dragon", "dune", "solana", "ethereum", "gmgn", "telegram", "bullx", "sharp",
];

/// 默认配置目录
///
/// 当前目录下存在 `config/` 时优先使用，否则落到用户配置目录。
pub fn default_config_dir() -> PathBuf {
    let local = PathBuf::from(LOCAL_CONFIG_DIR);
    if local.is_dir() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or(local)
}
