//! OpLauncher native-messaging host.
//!
//! Started by the browser with the extension origin as its argument. Talks
//! length-prefixed JSON over stdin/stdout and optionally accepts sealed
//! commands on a loopback TCP port.

mod app;
mod engine_process;

use std::path::{Path, PathBuf};

use clap::Parser;
use launcher_config_and_utils::{
    init_logging, CoreResult, HostSettings, JsonConfigStore, MemoryConfigStore, Paths,
};

/// OpLauncher host command-line interface.
#[derive(Parser)]
#[command(name = "oplauncher-host")]
#[command(about = "Native-messaging host that runs legacy applets out of process")]
#[command(version)]
struct Cli {
    /// Configuration file. Defaults to ~/.oplauncher/config.json
    #[arg(long, env = "OPLAUNCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Base directory for runtime files (config, logs). Defaults to ~/.oplauncher
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Mirror log lines to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Window handle Chrome passes on Windows
    #[arg(long, hide = true)]
    parent_window: Option<String>,

    /// Caller origin, and on Firefox the manifest path
    launch_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config_path = cli.config.unwrap_or_else(|| paths.config_file());
    let (mut settings, config_error) = match load_settings(&config_path) {
        Ok(settings) => (settings, None),
        // Built-in defaults keep the control channel off
        Err(e) => (HostSettings::from_store(&MemoryConfigStore::new())?, Some(e)),
    };
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    if let Err(e) = init_logging(&settings.log_level, Some(paths.host_log_file()), cli.verbose) {
        eprintln!("oplauncher-host: logging unavailable: {e}");
    }
    if let Some(e) = config_error {
        tracing::error!(path = %config_path.display(), error = %e, "Configuration unreadable, using defaults");
    }

    if let Some(window) = cli.parent_window.as_deref() {
        tracing::debug!(parent_window = window, "Launched from a browser window");
    }

    let code = match app::run_host(settings, &cli.launch_args).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Host terminated with an error");
            eprintln!("oplauncher-host: {e:#}");
            1
        }
    };

    // A read parked on stdin would otherwise hold the runtime open
    std::process::exit(code);
}

fn load_settings(path: &Path) -> CoreResult<HostSettings> {
    let store = JsonConfigStore::open_or_create(path, &HostSettings::default_document())?;
    HostSettings::from_store(&store)
}
