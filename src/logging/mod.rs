pub mod writer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
pub use writer::{redact, Redacting, RotatingFileWriter};

/// 单个日志文件的默认上限（10 MB）
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// 默认保留的轮转备份数
pub const DEFAULT_MAX_FILES: usize = 5;

/// 日志环境配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingEnvironment {
    /// 开发环境
    Development,
    /// 测试环境
    Testing,
    /// 生产环境
    Production,
}

/// 日志格式配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// 人类可读格式
    Pretty,
    /// JSON 格式
    Json,
    /// 紧凑格式
    Compact,
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub environment: LoggingEnvironment,
    pub level: Level,
    pub format: LogFormat,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 额外写入的 JSON 日志文件
    pub file_output: Option<PathBuf>,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::INFO,
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: false,
            file_output: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl LoggingConfig {
    pub fn development() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: true,
            ..Self::default()
        }
    }

    pub fn production() -> Self {
        Self {
            environment: LoggingEnvironment::Production,
            level: Level::INFO,
            format: LogFormat::Json,
            show_target: false,
            show_thread_ids: false,
            ..Self::default()
        }
    }

    pub fn testing() -> Self {
        Self {
            environment: LoggingEnvironment::Testing,
            level: Level::ERROR,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            ..Self::default()
        }
    }

    /// 根据命令行参数调整
    pub fn with_overrides(mut self, format: Option<LogFormat>, verbose: bool) -> Self {
        if let Some(format) = format {
            self.format = format;
        }
        if verbose && self.level < Level::DEBUG {
            self.level = Level::DEBUG;
        }
        self
    }

    pub fn with_file_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_output = Some(path.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

pub type FileLayer<S> = fmt::Layer<S, JsonFields, Format<Json>, Redacting<RotatingFileWriter>>;

/// 文件日志层：总是 JSON 格式，写出前脱敏
pub fn file_layer<S>(writer: RotatingFileWriter) -> FileLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Redacting::new(writer))
}

fn open_log_file(path: &Path, config: &LoggingConfig) -> std::io::Result<RotatingFileWriter> {
    RotatingFileWriter::open(path, config.max_file_size, config.max_files)
}

/// 初始化日志系统
///
/// 已经安装过全局 subscriber 时返回 `Ok(false)`，测试中多次调用不会失败。
/// 终端输出和日志文件都会经过 [`redact`]。
pub fn init_logging(config: &LoggingConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let ansi = config.environment != LoggingEnvironment::Production;
    let file_writer = match &config.file_output {
        Some(path) => Some(open_log_file(path, config)?),
        None => None,
    };
    let stderr = Redacting::new(std::io::stderr);

    let installed = match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(stderr)
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);
            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .with(file_writer.map(file_layer))
                .try_init()
                .is_ok()
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(stderr)
                .json()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids);
            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .with(file_writer.map(file_layer))
                .try_init()
                .is_ok()
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .with_writer(stderr)
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);
            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .with(file_writer.map(file_layer))
                .try_init()
                .is_ok()
        }
    };

    if installed {
        tracing::debug!(
            environment = ?config.environment,
            level = ?config.level,
            format = ?config.format,
            file = ?config.file_output,
            "Logging system initialized"
        );
    }

    Ok(installed)
}

/// 操作性能计时器
pub struct OperationTimer {
    start: Instant,
    operation: String,
    metadata: HashMap<String, String>,
    finished: bool,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            finished: false,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// 完成计时并记录日志，返回耗时
    pub fn finish(mut self) -> Duration {
        let duration = self.start.elapsed();
        self.finished = true;

        tracing::info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            metadata = ?self.metadata,
            "Operation completed"
        );
        duration
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!(
            operation = %self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            metadata = ?self.metadata,
            "Operation timer dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_creation() {
        let dev_config = LoggingConfig::development();
        assert_eq!(dev_config.environment, LoggingEnvironment::Development);
        assert_eq!(dev_config.level, Level::DEBUG);
        assert_eq!(dev_config.format, LogFormat::Pretty);

        let prod_config = LoggingConfig::production();
        assert_eq!(prod_config.environment, LoggingEnvironment::Production);
        assert_eq!(prod_config.format, LogFormat::Json);

        let test_config = LoggingConfig::testing();
        assert_eq!(test_config.level, Level::ERROR);
        assert_eq!(test_config.format, LogFormat::Compact);
    }

    #[test]
    fn test_overrides_raise_level_when_verbose() {
        let config = LoggingConfig::production().with_overrides(Some(LogFormat::Compact), true);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.level, Level::DEBUG);

        // TRACE 已经比 DEBUG 更详细，不应被降低
        let mut trace = LoggingConfig::default();
        trace.level = Level::TRACE;
        assert_eq!(trace.with_overrides(None, true).level, Level::TRACE);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LoggingConfig::testing();
        assert!(init_logging(&config).is_ok());
        assert_eq!(init_logging(&config).ok(), Some(false));
    }

    #[test]
    fn test_file_output_defaults_and_builder() {
        let config = LoggingConfig::production();
        assert!(config.file_output.is_none());
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);

        let config = config.with_file_output("logs/sol_tools.log");
        assert_eq!(config.file_output, Some(PathBuf::from("logs/sol_tools.log")));
    }

    #[test]
    fn test_file_layer_writes_redacted_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/sol_tools.log");
        let writer = RotatingFileWriter::open(&path, DEFAULT_MAX_FILE_SIZE, 1).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(writer));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                module = "dune",
                api_key = "0123456789abcdef0123456789abcdef",
                "Loaded credentials"
            );
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["fields"]["message"], "Loaded credentials");
        assert_eq!(line["fields"]["module"], "dune");
        assert_eq!(line["fields"]["api_key"], "********");
        assert!(!content.contains("0123456789abcdef"));
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation")
            .with_metadata("module", "dragon")
            .with_metadata("phase", "initialize");

        assert_eq!(timer.operation, "test_operation");
        assert_eq!(timer.metadata.get("module"), Some(&"dragon".to_string()));

        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
        assert!(timer.finish() >= Duration::from_millis(1));
    }
}
