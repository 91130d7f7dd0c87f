//! 彩色 stderr 日志，格式与内核控制台一致：`[LEVEL] message`

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::time::Instant;

static START: Lazy<Instant> = Lazy::new(Instant::now);

struct Logger;

static LOGGER: Logger = Logger;

/// 注册 logger 并设置最大日志级别
///
/// `env` 为 "trace"、"debug"、"info"、"warn"、"error" 之一（不区分大小写），
/// 为 `None` 或无法解析时使用 `Trace`。
pub fn init(env: Option<&str>) {
    Lazy::force(&START);
    // 重复注册时忽略错误
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(parse_level(env));
}

pub fn parse_level(env: Option<&str>) -> LevelFilter {
    match env.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31,
            Level::Warn => 93,
            Level::Info => 34,
            Level::Debug => 32,
            Level::Trace => 90,
        };
        eprintln!(
            "\x1b[{}m[{:>5}] {:>6}ms {}\x1b[0m",
            color,
            record.level(),
            START.elapsed().as_millis(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("WARN")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
        assert_eq!(parse_level(Some("verbose")), LevelFilter::Trace);
        assert_eq!(parse_level(None), LevelFilter::Trace);
    }
}
