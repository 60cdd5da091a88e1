//! Kernel log backend.
//!
//! Lines go to stderr as `[LEVEL][file:line] message`, colored by level.
//! The maximum level comes from the `LOG` environment variable and defaults
//! to `Off` so statistics output stays clean.

use std::io::Write;

use log::{Level, LevelFilter};

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "\u{1B}[{}m[{:>5}][{}:{}] {}\u{1B}[0m",
            level2color(record.level()),
            record.level(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the logger and pick the max level from the `LOG` env var.
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;
    log::set_logger(&LOGGER).ok();
    log::set_max_level(match std::env::var("LOG").as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        Ok("info") => LevelFilter::Info,
        Ok("warn") => LevelFilter::Warn,
        Ok("error") => LevelFilter::Error,
        _ => LevelFilter::Off,
    });
}

pub fn level2color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 36,  // Cyan
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}
