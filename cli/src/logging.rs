//! Tracing init for the `smithers` binary: human-readable formatter on a TTY
//! stderr, JSON lines when piped or `--json`, plus a rolling file writer
//! under `~/.config/smithers/logs/` when `--verbose` or `SMITHERS_LOG` is set.
//!
//! Split from [`crate::log_format`] the way the teacher's `cli/src/logging.rs`
//! + `log_format.rs` are split: this module owns subscriber wiring, the other
//! owns the `FormatEvent` impl.

use std::io::IsTerminal;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::log_format::TextWithSpanIds;

/// Keeps the file appender's background flush thread alive; drop it at the
/// end of `main` to ensure buffered lines are written before exit.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter(verbose: bool) -> EnvFilter {
    if let Ok(spec) = std::env::var("SMITHERS_LOG") {
        return EnvFilter::new(spec);
    }
    if let Ok(spec) = std::env::var("RUST_LOG") {
        return EnvFilter::new(spec);
    }
    EnvFilter::new(if verbose { "info" } else { "warn" })
}

fn logs_dir() -> Option<std::path::PathBuf> {
    let base = cross_xdg::BaseDirs::new().ok()?;
    Some(base.config_home().join("smithers").join("logs"))
}

/// Installs the global tracing subscriber. `json` selects JSON-lines
/// formatting for stderr (used when `--json` is passed or stderr isn't a
/// TTY); `verbose` raises the default filter and enables the file sink.
pub fn init(verbose: bool, json: bool) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    let stderr_json = json || !std::io::stderr().is_terminal();

    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = if stderr_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .event_format(TextWithSpanIds::new())
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, file_guard): (Option<Box<dyn Layer<Registry> + Send + Sync>>, _) =
        if verbose || std::env::var("SMITHERS_LOG").is_ok() {
            match logs_dir() {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    let file_appender = tracing_appender::rolling::daily(&dir, "smithers.log");
                    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                    let layer = tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .boxed();
                    (Some(layer), Some(guard))
                }
                None => (None, None),
            }
        } else {
            (None, None)
        };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
