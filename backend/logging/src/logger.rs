//! Structured Logger
//!
//! Wraps `tracing` with an env-controlled filter, a console layer (plain or
//! JSON), and an optional daily-rotated NDJSON file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false, file_dir: None }
    }
}

/// Keeps the background file writer alive; drop it at shutdown to flush.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global subscriber. Calling it twice is a no-op.
pub fn init_logger(options: &LoggerOptions) -> LogGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = if options.json {
        fmt::layer().json().with_writer(std::io::stdout).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_ansi(true)
            .boxed()
    };

    let (file_layer, guard) = match &options.file_dir {
        Some(dir) => {
            // Writes NDJSON to `<dir>/bilbot.log.YYYY-MM-DD`
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "bilbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}
