//! # Observability
//!
//! Centralized logging layer for the OpLauncher host.
//!
//! The host's stdout is the browser's native-messaging channel, so nothing
//! here ever writes to stdout. Log lines go to an append-only JSONL file
//! (`~/.oplauncher/logs/host.jsonl` by default) and, when requested, to
//! stderr.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() -> std::io::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "oplauncher-host".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     })?;
//!
//!     tracing::info!("host started");
//!     Ok(())
//! }
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

pub use file::CentralLogWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.oplauncher/logs/host.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// Fails if the log file cannot be created. Calling this twice in one
/// process leaves the first subscriber in place.
pub fn init_with_config(config: LogConfig) -> std::io::Result<()> {
    file::init_file_subscriber(&config)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
