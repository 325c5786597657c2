//! Logging setup for quant-mirror.
//!
//! Console output goes to stderr so stdout stays clean for reports and
//! `scrape --json`. When `observability.log_file` is set, every event is also
//! appended to that file as one JSON object per line, which keeps a run's
//! order decisions on disk next to the trade reports.
//!
//! # Noise Filtering
//!
//! The CDP client and its websocket stack log every protocol frame at debug
//! level. Those modules are pinned to `warn` so that `debug` stays usable for
//! pipeline diagnostics.

use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::format::{FmtSpan, Format, Json, JsonFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Modules filtered to warn level regardless of the base level.
pub const NOISY_MODULES: &[&str] = &[
    "chromiumoxide",
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "hyper_util",
    "html5ever",
    "selectors",
];

/// Console rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human output with colors
    Pretty,
    /// One line per event, no colors
    Compact,
    /// Structured JSON lines
    Json,
}

impl LogFormat {
    /// Unknown names fall back to [`LogFormat::Pretty`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" | "plain" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Filter directives for the given base level.
pub fn build_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    directives
}

fn build_filter(log_level: &str) -> EnvFilter {
    // RUST_LOG wins when set
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(build_directives(log_level)))
}

/// Open `path` for appending, creating parent directories.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Io(e).with_context(format!("creating {}", parent.display())))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Io(e).with_context(format!("opening log file {}", path.display())))
}

type FileLayer<S> = fmt::Layer<S, JsonFields, Format<Json>, Mutex<File>>;

/// JSON-lines layer writing into `file`.
fn file_layer<S>(file: File) -> FileLayer<S> {
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
}

/// Initialize logging from the observability settings.
///
/// Fails only when the log file cannot be opened. A second call keeps the
/// subscriber installed by the first.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let format = LogFormat::from_name(&config.log_format);
    let file = config.log_file.as_deref().map(open_log_file).transpose()?;

    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
    });
    let compact = (format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stderr)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_ansi(true)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(json)
        .with(compact)
        .with(pretty)
        .with(file.map(file_layer))
        .try_init()
        .is_ok();

    tracing::debug!(
        log_level = %config.log_level,
        ?format,
        log_file = ?config.log_file,
        installed,
        "Logging initialized"
    );
    Ok(())
}
