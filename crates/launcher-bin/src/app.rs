//! Host wiring: settings in, channels up, wait for the end.

use crate::engine_process::ProcessEngine;
use anyhow::Context;
use applet_session::{ControlSecurity, Dispatcher, PrimaryExit};
use launcher_config_and_utils::{HostSettings, SecuritySettings};
use launcher_ipc::{ControlServer, FramedTransport, IpcResult, ShutdownSignal};
use launcher_storage::{create_storage, SecureStorage, StorageResult, TokenManager};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run the host until the browser closes stdin, the applet is unloaded,
/// or the process is interrupted.
pub async fn run_host(settings: HostSettings, launch_args: &[String]) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        origin = launch_args.first().map(String::as_str).unwrap_or("unknown"),
        engine = %settings.engine.command,
        op_server_enabled = settings.op_server.enabled,
        "Starting OpLauncher host"
    );

    let shutdown = ShutdownSignal::new();
    let engine = Arc::new(ProcessEngine::new(
        settings.engine.command.clone(),
        settings.engine.args.clone(),
    ));

    let control = control_channel_security(&settings, create_storage).await;
    let dispatcher = Dispatcher::new(
        engine.clone(),
        control.clone().unwrap_or(ControlSecurity::Plain),
        shutdown.clone(),
    );

    let control_task = match control {
        Some(_) => start_control_channel(&dispatcher, settings.op_server.port).await,
        None => None,
    };

    let mut transport = FramedTransport::new(tokio::io::stdin(), tokio::io::stdout());
    let outcome = tokio::select! {
        result = dispatcher.run_primary_loop(&mut transport) => result,
        _ = interrupted() => {
            info!("Interrupted, shutting down");
            Ok(PrimaryExit::Shutdown)
        }
    };

    shutdown.trigger();
    if let Some(task) = control_task {
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            warn!("Control channel did not stop in time");
        }
    }
    engine.terminate().await;

    let exit = outcome.context("native-messaging channel failed")?;
    info!(?exit, "Host stopped");
    Ok(())
}

/// Security for the TCP channel, or `None` when the channel stays off.
///
/// The Secret Store is only touched when the channel is enabled.
async fn control_channel_security<F>(
    settings: &HostSettings,
    open_store: F,
) -> Option<ControlSecurity>
where
    F: FnOnce() -> StorageResult<Box<dyn SecureStorage>> + Send + 'static,
{
    if !settings.op_server.enabled {
        return None;
    }
    match control_security(&settings.security, open_store).await {
        Ok(control) => Some(control),
        Err(e) => {
            error!(error = %e, "Control channel security unavailable, channel disabled");
            None
        }
    }
}

/// Envelope mode needs the Secret Store; plain mode does not.
///
/// Opening the store and resolving the token both run on the blocking
/// pool. The Linux backend drives its own runtime and panics on a worker.
async fn control_security<F>(
    security: &SecuritySettings,
    open_store: F,
) -> anyhow::Result<ControlSecurity>
where
    F: FnOnce() -> StorageResult<Box<dyn SecureStorage>> + Send + 'static,
{
    if !security.secure_payload {
        warn!("secure_payload is off, control channel accepts plain JSON");
        return Ok(ControlSecurity::Plain);
    }

    let max_days = security.token_max_days;
    let tokens = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<TokenManager>> {
        let storage = open_store().context("opening secret store")?;
        let tokens = Arc::new(TokenManager::new(Arc::from(storage), max_days));
        // Make sure a current token exists before any client asks for it
        tokens.get_active_key().context("resolving active token")?;
        Ok(tokens)
    })
    .await
    .context("secret store task failed")??;

    Ok(ControlSecurity::Envelope(tokens))
}

/// Bind the loopback control port. Failure leaves the host running without it.
async fn start_control_channel(
    dispatcher: &Dispatcher,
    port: u16,
) -> Option<JoinHandle<IpcResult<()>>> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match ControlServer::bind(addr).await {
        Ok(server) => Some(tokio::spawn(server.run(
            dispatcher.control_handler(),
            dispatcher.shutdown_signal().clone(),
        ))),
        Err(e) => {
            error!(error = %e, "Control channel failed to start, continuing without it");
            None
        }
    }
}

#[cfg(unix)]
async fn interrupted() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn interrupted() {
    let _ = tokio::signal::ctrl_c().await;
}
