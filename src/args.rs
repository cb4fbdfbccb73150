use crate::logging::LogFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sol-tools - 链上数据工具集的适配器管理
#[derive(Parser, Debug)]
#[command(name = "sol-tools")]
#[command(version)]
#[command(about = "管理 Dragon / Solana / Ethereum / Sharp / GMGN / Dune 适配器的配置与生命周期")]
pub struct Args {
    /// 子命令
    #[command(subcommand)]
    pub command: Command,

    /// 测试模式（读取 test_config.json，缺少凭证不报错）
    #[arg(long, global = true)]
    pub test_mode: bool,

    /// 配置目录
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// 指定 .env 文件
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// 详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 日志格式
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// 同时写入 JSON 日志文件（按大小轮转）
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 初始化、校验并清理所有适配器，输出状态
    Status,
    /// 检查模块所需的环境变量
    Env {
        /// 模块名，缺省时检查全部模块
        module: Option<String>,
    },
    /// 读写配置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// 读取点号路径上的值
    Get { path: String },
    /// 写入点号路径，VALUE 按环境变量规则转换类型
    Set {
        path: String,
        value: String,
        /// 只修改内存，不写回文件
        #[arg(long)]
        no_save: bool,
    },
    /// 输出完整配置
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "sol-tools",
            "config",
            "set",
            "dune.batch_size",
            "5",
            "--no-save",
            "--test-mode",
        ]);
        assert!(args.test_mode);
        match args.command {
            Command::Config {
                action: ConfigAction::Set { path, value, no_save },
            } => {
                assert_eq!(path, "dune.batch_size");
                assert_eq!(value, "5");
                assert!(no_save);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_log_file_flag() {
        let args = Args::parse_from(["sol-tools", "status", "--log-file", "logs/sol_tools.log"]);
        assert_eq!(args.log_file, Some(PathBuf::from("logs/sol_tools.log")));
    }

    #[test]
    fn test_log_format_value() {
        let args = Args::parse_from(["sol-tools", "--log-format", "json", "env", "dune"]);
        assert_eq!(args.log_format, Some(LogFormat::Json));
        assert!(args.log_file.is_none());
        assert!(matches!(args.command, Command::Env { module: Some(ref m) } if m == "dune"));
    }
}
