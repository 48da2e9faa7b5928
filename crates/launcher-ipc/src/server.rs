//! TCP control channel.
//!
//! Each connection carries exactly one message: bytes up to the first
//! newline or EOF. The handler's reply, if any, is written back as one
//! newline-terminated line and the connection is closed.

use crate::{IpcError, IpcResult, ShutdownSignal, MAX_MESSAGE_SIZE};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Handler for one raw control message. `None` means "no reply".
pub type ControlHandler = Arc<
    dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send>> + Send + Sync,
>;

/// Listener for the TCP control channel.
pub struct ControlServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ControlServer {
    /// Bind and listen on `addr`.
    pub async fn bind(addr: SocketAddr) -> IpcResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| IpcError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wrap an async closure as a [`ControlHandler`].
    pub fn handler<F, Fut>(f: F) -> ControlHandler
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
    {
        Arc::new(move |message| Box::pin(f(message)))
    }

    /// Accept connections until `shutdown` is triggered.
    ///
    /// Every connection runs on its own task. Accept errors are logged and
    /// do not stop the listener.
    pub async fn run(self, handler: ControlHandler, shutdown: ShutdownSignal) -> IpcResult<()> {
        info!(addr = %self.local_addr, "Control channel listening");

        loop {
            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer, handler).await {
                                    warn!(peer = %peer, error = %e, "Control connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown.wait() => {
                    break;
                }
            }
        }

        info!("Control channel shutting down");
        Ok(())
    }
}

/// Read one message, hand it to the handler, write back the reply.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: ControlHandler,
) -> IpcResult<()> {
    let (reader, mut writer) = stream.into_split();
    // One byte of slack tells an oversize message apart from a full one
    let mut reader = BufReader::new(reader).take(MAX_MESSAGE_SIZE as u64 + 1);

    let mut message = Vec::new();
    reader.read_until(b'\n', &mut message).await?;
    if message.last() == Some(&b'\n') {
        message.pop();
        if message.last() == Some(&b'\r') {
            message.pop();
        }
    }

    if message.len() > MAX_MESSAGE_SIZE {
        warn!(peer = %peer, "Control message exceeds size limit, dropping");
        return Ok(());
    }
    if message.iter().all(u8::is_ascii_whitespace) {
        debug!(peer = %peer, "Empty control message");
        return Ok(());
    }

    debug!(peer = %peer, size = message.len(), "Received control message");

    if let Some(mut reply) = handler(message).await {
        reply.push(b'\n');
        writer.write_all(&reply).await?;
        writer.flush().await?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}
