//! 日志输出：敏感信息脱敏与按大小轮转的日志文件

use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::{Captures, Regex, Replacer};
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

const MASK: &str = "********";

const API_KEY_PATTERN: &str = r#"(?i)(["']?(?:api[_-]?key|api[_-]?token|access[_-]?token|auth[_-]?token|bot[_-]?token)["']?\s*[:=]\s*["']?)([a-zA-Z0-9:_-]{16,128})"#;
const PRIVATE_KEY_PATTERN: &str = r#"(?i)(["']?(?:private[_-]?key|secret[_-]?key)["']?\s*[:=]\s*["']?)((?:0x)?[a-fA-F0-9]{32,128}|[1-9A-HJ-NP-Za-km-z]{64,128})"#;
const JWT_PATTERN: &str = r"eyJ[a-zA-Z0-9_-]{5,}\.eyJ[a-zA-Z0-9_-]{5,}\.[a-zA-Z0-9_-]{5,}";
const PASSWORD_PATTERN: &str = r#"(?i)(["']?(?:password|passwd)["']?\s*[:=]\s*["']?)([^"'\s,}]{3,})"#;

struct SensitivePatterns {
    api_key: Regex,
    private_key: Regex,
    jwt: Regex,
    password: Regex,
}

impl SensitivePatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            api_key: Regex::new(API_KEY_PATTERN)?,
            private_key: Regex::new(PRIVATE_KEY_PATTERN)?,
            jwt: Regex::new(JWT_PATTERN)?,
            password: Regex::new(PASSWORD_PATTERN)?,
        })
    }
}

lazy_static! {
    static ref PATTERNS: Option<SensitivePatterns> = SensitivePatterns::compile().ok();
}

fn replace_owned<R: Replacer>(pattern: &Regex, text: &str, replacement: R) -> Option<String> {
    match pattern.replace_all(text, replacement) {
        Cow::Owned(replaced) => Some(replaced),
        Cow::Borrowed(_) => None,
    }
}

/// 遮盖 API key、token、JWT、私钥和密码，没有匹配时不分配内存
pub fn redact(line: &str) -> Cow<'_, str> {
    let Some(patterns) = PATTERNS.as_ref() else {
        return Cow::Borrowed(line);
    };
    let mask_value = |caps: &Captures<'_>| format!("{}{}", &caps[1], MASK);

    let mut text = Cow::Borrowed(line);
    for pattern in [&patterns.api_key, &patterns.private_key] {
        if let Some(masked) = replace_owned(pattern, &text, mask_value) {
            text = Cow::Owned(masked);
        }
    }
    if let Some(masked) = replace_owned(&patterns.jwt, &text, MASK) {
        text = Cow::Owned(masked);
    }
    let mask_password =
        |caps: &Captures<'_>| format!("{}{}", &caps[1], "*".repeat(caps[2].chars().count()));
    if let Some(masked) = replace_owned(&patterns.password, &text, mask_password) {
        text = Cow::Owned(masked);
    }
    text
}

/// 包装任意 `MakeWriter`，写出前先脱敏
#[derive(Debug, Clone)]
pub struct Redacting<M> {
    inner: M,
}

impl<M> Redacting<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for Redacting<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
        }
    }
}

/// fmt 层每个事件整体写入一次，因此按次脱敏即可
pub struct RedactingWriter<W> {
    inner: W,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(redact(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    max_files: usize,
    file: File,
    size: u64,
}

impl RotatingFile {
    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{index}"));
        self.path.with_file_name(name)
    }

    /// `app.log` → `app.log.1` → `app.log.2` ...，超出 `max_files` 的备份被丢弃
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.max_files > 0 {
            let oldest = self.backup_path(self.max_files);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.max_files).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

/// 按大小轮转的日志文件，克隆的句柄共享同一个文件
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingFileWriter {
    /// 以追加方式打开，必要时创建父目录
    pub fn open(path: impl AsRef<Path>, max_size: u64, max_files: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFile {
                path,
                max_size,
                max_files,
                file,
                size,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.inner.lock();
        if file.size > 0 && file.size >= file.max_size {
            file.rotate()?;
        }
        let written = file.file.write(buf)?;
        file.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_masks_credentials() {
        let line = r#"{"fields":{"api_key":"0123456789abcdef0123456789abcdef","module":"dune"}}"#;
        let masked = redact(line);
        assert!(!masked.contains("0123456789abcdef"));
        assert!(masked.contains(r#""api_key":"********""#));
        assert!(masked.contains("dune"));

        assert_eq!(
            redact("SOLSCAN_API_KEY=abcdefghijklmnopqrstuvwxyz123456"),
            "SOLSCAN_API_KEY=********"
        );
        assert_eq!(redact("password: hunter22 ok"), "password: ******** ok");
        assert_eq!(
            redact("token eyJhbGciOi.eyJzdWIiOi.c2lnbmF0dXJl done"),
            "token ******** done"
        );
        assert_eq!(
            redact(&format!("private_key={}", "ab".repeat(32))),
            "private_key=********"
        );
    }

    #[test]
    fn test_patterns_compile() {
        assert!(PATTERNS.is_some());
    }

    #[test]
    fn test_redact_leaves_plain_lines_borrowed() {
        let line = "Adapter state changed module=dune from=initializing to=ready";
        assert!(matches!(redact(line), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rotation_keeps_limited_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/sol_tools.log");
        let mut writer = RotatingFileWriter::open(&path, 32, 2).unwrap();

        for i in 0..4 {
            writer.write_all(format!("line {i} {}\n", "x".repeat(30)).as_bytes()).unwrap();
        }
        writer.flush().unwrap();

        let current = fs::read_to_string(&path).unwrap();
        assert!(current.starts_with("line 3"));
        assert!(fs::read_to_string(dir.path().join("logs/sol_tools.log.1"))
            .unwrap()
            .starts_with("line 2"));
        assert!(fs::read_to_string(dir.path().join("logs/sol_tools.log.2"))
            .unwrap()
            .starts_with("line 1"));
        assert!(!dir.path().join("logs/sol_tools.log.3").exists());
    }

    #[test]
    fn test_reopen_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "earlier\n").unwrap();

        let mut writer = RotatingFileWriter::open(&path, 1024, 1).unwrap();
        writer.write_all(b"later\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
        assert_eq!(writer.path(), path);
    }
}
