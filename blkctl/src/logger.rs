//! 输出到 stderr 的 `log::Log` 实现，格式为带颜色的 `[LEVEL] message`

use log::{Level, LevelFilter, Log, Metadata, Record};

struct Logger;

static LOGGER: Logger = Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
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
            "\x1b[{}m[{:>5}] {}\x1b[0m",
            color,
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// 解析日志级别，无法解析时返回 `Trace`
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Trace)
}

/// 注册 logger 并设置最大日志级别
///
/// 重复调用只会更新级别。
pub fn init(level: &str) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(parse_level(level));
}
