//! 日志初始化.
//!
//! 控制台输出带颜色的本地时间格式, 文件输出按日期命名 (`<prefix>.<YYYY-MM-DD>.log`).
//! 库 crate 通过 `log` 门面输出的记录经 `tracing-log` 桥接后同样写入两处.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 文件日志过滤表达式, 与 `RUST_LOG` 语法相同
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
    /// 历史日志保留天数, 跨日切换文件时清理
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    30
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub fn init(config: LoggingConfig) -> Result<()> {
    fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let directory = Path::new(&config.directory);
    let today = Local::now().date_naive();
    cleanup_expired_logs(directory, &config.file_prefix, today, config.retention_days)?;
    let file_appender = CurrentFileWriter::new(directory, &config.file_prefix, config.retention_days)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD.set(guard).ok();

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("日志级别无效: {}", config.level))?;

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(console_filter);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("全局日志订阅器已初始化")?;

    Ok(())
}

/// 按日期切换的文件写入器; 跨日时打开新文件并清理过期日志
struct CurrentFileWriter {
    directory: PathBuf,
    prefix: String,
    retention_days: i64,
    date: NaiveDate,
    file: File,
}

impl CurrentFileWriter {
    fn new(directory: &Path, prefix: &str, retention_days: i64) -> Result<Self> {
        let date = Local::now().date_naive();
        let file = open_append_file(&build_current_log_path(directory, prefix, date))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            retention_days,
            date,
            file,
        })
    }

    fn rotate(&mut self, date: NaiveDate) -> std::io::Result<()> {
        let file_path = build_current_log_path(&self.directory, &self.prefix, date);
        self.file = open_append_file(&file_path).map_err(std::io::Error::other)?;
        self.date = date;
        // 清理失败只告警, 不影响写入
        if let Err(err) = cleanup_expired_logs(&self.directory, &self.prefix, date, self.retention_days)
        {
            tracing::warn!("跨日清理过期日志失败, dir={}: {:#}", self.directory.display(), err);
        }
        Ok(())
    }
}

impl Write for CurrentFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = Local::now().date_naive();
        if today != self.date {
            self.rotate(today)?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

pub(crate) fn build_current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 从文件名解析日志日期; 前缀不符或格式错误返回 `None`
fn parse_log_date(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// 删除早于 `today - retention_days` 的日志文件, 返回删除个数
pub fn cleanup_expired_logs(
    directory: &Path,
    prefix: &str,
    today: NaiveDate,
    retention_days: i64,
) -> Result<usize> {
    let Some(cutoff) = today.checked_sub_signed(chrono::Duration::days(retention_days)) else {
        return Ok(0);
    };
    let mut removed = 0;
    let entries = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(|n| parse_log_date(n, prefix)) else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(entry.path())
                .with_context(|| format!("删除过期日志失败, path={}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "{}{:5}\x1b[0m {}:{} > ",
            color,
            meta.level().to_string(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0)
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        // log 桥接记录的 target 为模块路径
        write!(
            writer,
            "[{}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}] {:5} {} > ",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        match NaiveDate::from_ymd_opt(y, m, d) {
            Some(date) => date,
            None => panic!("测试日期初始化失败"),
        }
    }

    #[test]
    fn test_build_current_log_path() {
        let path = build_current_log_path(Path::new("logs"), "ac3enc", date(2026, 2, 6));
        assert_eq!(path, PathBuf::from("logs/ac3enc.2026-02-06.log"));
    }

    #[test]
    fn test_parse_log_date() {
        assert_eq!(
            parse_log_date("ac3enc.2026-02-06.log", "ac3enc"),
            Some(date(2026, 2, 6))
        );
        assert_eq!(parse_log_date("other.2026-02-06.log", "ac3enc"), None);
        assert_eq!(parse_log_date("ac3enc.2026-02-06.log.gz", "ac3enc"), None);
        assert_eq!(parse_log_date("ac3enc.bad.log", "ac3enc"), None);
    }

    #[test]
    fn test_cleanup_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        let today = date(2026, 3, 10);
        for d in [date(2026, 3, 10), date(2026, 3, 3), date(2026, 3, 2), date(2026, 1, 1)] {
            File::create(build_current_log_path(dir.path(), "ac3enc", d)).unwrap();
        }
        File::create(dir.path().join("notes.txt")).unwrap();

        let removed = cleanup_expired_logs(dir.path(), "ac3enc", today, 7).unwrap();
        assert_eq!(removed, 2);
        assert!(build_current_log_path(dir.path(), "ac3enc", date(2026, 3, 3)).exists());
        assert!(!build_current_log_path(dir.path(), "ac3enc", date(2026, 3, 2)).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_rotate_cleanup_failure_keeps_writing() {
        let dir = tempfile::tempdir().unwrap();
        // 与日志同名的目录无法按文件删除, 清理必然失败
        let blocked = build_current_log_path(dir.path(), "ac3enc", date(2020, 1, 1));
        fs::create_dir(&blocked).unwrap();

        let mut writer = CurrentFileWriter::new(dir.path(), "ac3enc", 30).unwrap();
        writer.date = date(2020, 1, 3);
        writer.write_all(b"after rotate\n").unwrap();
        writer.flush().unwrap();

        let today = writer.date;
        assert_ne!(today, date(2020, 1, 3));
        let content = fs::read_to_string(build_current_log_path(dir.path(), "ac3enc", today)).unwrap();
        assert!(content.contains("after rotate"));
        assert!(blocked.is_dir());
    }
}
