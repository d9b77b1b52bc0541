//! Logger module
//!
//! Compact logging: `[LEVEL] message`, no timestamps, no module paths.
//!
//! # Usage
//!
//! ```rust
//! use kernel_il::util::logger;
//!
//! logger::init();
//! tracing::info!("building {} functions", 3);
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Initialize logger with default configuration (INFO level)
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logger with custom level.
///
/// Panics if a global subscriber is already installed; use [`try_init`]
/// where that may happen (tests, embedding).
pub fn init_with_level(level: LogLevel) {
    layered(level).init();
}

/// Like [`init_with_level`], but returns `false` instead of panicking when a
/// subscriber was already installed.
pub fn try_init(level: LogLevel) -> bool {
    layered(level).try_init().is_ok()
}

fn layered(level: LogLevel) -> impl SubscriberInitExt {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    // 不显示时间、不显示模块路径、无颜色
    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(filter);

    Registry::default().with(layer)
}
