//! Timestamped logging to stdout or an append-only log file.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//! file = "/var/log/cdog.log"   # optional, same as --logto
//!
//! [logging.modules]
//! "cdog::watcher" = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug cdog /srv/www
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Local wall-clock time: YYYY-MM-DD HH:MM:SS.mmm
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Where log lines ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

/// Build the filter directive string from config.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Open the log file for appending, or report why not.
fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging with configuration.
///
/// Call once at startup; later calls do nothing and report stdout. When
/// `config.file` cannot be opened a notice is printed and output falls back
/// to stdout.
pub fn init_with_config(config: &LoggingConfig) -> LogTarget {
    let mut target = LogTarget::Stdout;

    INIT.call_once(|| {
        // RUST_LOG env var takes precedence over config
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let file = config.file.as_deref().and_then(|path| match open_log_file(path) {
            Ok(file) => Some((path.to_path_buf(), file)),
            Err(e) => {
                println!(
                    "Error opening log file \"{}\": {e}\nAll output will be redirected to stdout",
                    path.display()
                );
                None
            }
        });

        let (writer, ansi) = match file {
            Some((path, file)) => {
                target = LogTarget::File(path);
                (BoxMakeWriter::new(Mutex::new(file)), false)
            }
            None => (BoxMakeWriter::new(std::io::stdout), true),
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_timer(LocalTime)
            .with_level(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });

    target
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "watching", "{}", path.display());
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("dispatcher", "dropped", "unknown {handle}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
