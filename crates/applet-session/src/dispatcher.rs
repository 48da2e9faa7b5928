//! Routes raw messages from both ingress channels into the session.

use crate::{AppletSession, ExecutionEngine};
use launcher_ipc::{
    error_codes, parse, Command, ControlHandler, ControlServer, FrameError, FramedTransport,
    Response, ShutdownSignal, MAX_MESSAGE_SIZE,
};
use launcher_storage::TokenManager;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Sent when a response cannot be serialized within the frame limit.
const UNENCODABLE_RESPONSE: &str =
    r#"{"status":"error","error":"response could not be encoded","errorCode":7000}"#;

/// How control-channel messages are protected.
#[derive(Clone)]
pub enum ControlSecurity {
    /// Each message is an envelope sealed with the active token.
    Envelope(Arc<TokenManager>),
    /// Messages are plain JSON commands.
    Plain,
}

/// Why the primary loop returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryExit {
    EndOfStream,
    Shutdown,
}

#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<AppletSession>,
    control: ControlSecurity,
    shutdown: ShutdownSignal,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        control: ControlSecurity,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            session: Arc::new(AppletSession::new(engine, shutdown.clone())),
            control,
            shutdown,
        }
    }

    pub fn session(&self) -> &AppletSession {
        &self.session
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Handle one native-messaging payload. Every payload gets a response.
    pub async fn handle_primary(&self, raw: &[u8]) -> Response {
        match parse(raw) {
            Ok(command) => self.execute(&command).await,
            Err(e) => {
                warn!(error = %e, "Rejected native-messaging payload");
                Response::error(e.to_string(), e.error_code())
            }
        }
    }

    /// Handle one control-channel message.
    ///
    /// Messages that fail authentication or decoding are dropped and get
    /// no response.
    pub async fn handle_control(&self, raw: Vec<u8>) -> Option<Response> {
        let plaintext = match &self.control {
            ControlSecurity::Plain => raw,
            ControlSecurity::Envelope(tokens) => {
                let tokens = tokens.clone();
                // Platform secret stores block
                let key = match tokio::task::spawn_blocking(move || tokens.get_active_key()).await {
                    Ok(Ok(key)) => key,
                    Ok(Err(e)) => {
                        error!(error = %e, "Active token unavailable, dropping control message");
                        return None;
                    }
                    Err(e) => {
                        error!(error = %e, "Token lookup task failed");
                        return None;
                    }
                };
                match envelope_crypto::open_bytes(&raw, &key) {
                    Ok(text) => text.into_bytes(),
                    Err(e) => {
                        warn!(error = %e, "Dropping control message that failed to open");
                        return None;
                    }
                }
            }
        };

        match parse(&plaintext) {
            Ok(command) => Some(self.execute(&command).await),
            Err(e) => {
                warn!(error = %e, "Dropping malformed control message");
                None
            }
        }
    }

    /// Adapter for [`ControlServer::run`].
    pub fn control_handler(&self) -> ControlHandler {
        let dispatcher = self.clone();
        ControlServer::handler(move |raw: Vec<u8>| {
            let dispatcher = dispatcher.clone();
            async move {
                let response = dispatcher.handle_control(raw).await?;
                Some(encode_response(&response))
            }
        })
    }

    /// Serve the native-messaging channel until EOF, a fatal frame error,
    /// or shutdown.
    ///
    /// On a fatal frame error one error response is attempted before the
    /// error is returned.
    pub async fn run_primary_loop<R, W>(
        &self,
        transport: &mut FramedTransport<R, W>,
    ) -> Result<PrimaryExit, FrameError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown requested, leaving native-messaging loop");
                return Ok(PrimaryExit::Shutdown);
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    info!("Shutdown requested, leaving native-messaging loop");
                    return Ok(PrimaryExit::Shutdown);
                }
                next = transport.read_message() => next,
            };

            let raw = match next {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("Native-messaging peer closed the stream");
                    return Ok(PrimaryExit::EndOfStream);
                }
                Err(e) => {
                    error!(error = %e, "Native-messaging channel failed");
                    let reply = Response::error(e.to_string(), e.error_code());
                    if let Err(send_err) = transport.send_message(&encode_response(&reply)).await {
                        debug!(error = %send_err, "Could not report channel failure");
                    }
                    return Err(e);
                }
            };

            debug!(size = raw.len(), "Native-messaging request");
            let response = self.handle_primary(&raw).await;
            transport.send_message(&encode_response(&response)).await?;
        }
    }

    async fn execute(&self, command: &Command) -> Response {
        debug!(op = %command.opcode, "Dispatching command");
        match self.session.apply(command).await {
            Ok(message) => Response::success(message),
            Err(e) => {
                warn!(op = %command.opcode, error = %e, "Command failed");
                Response::error(e.to_string(), e.error_code())
            }
        }
    }
}

/// JSON bytes for `response`, always within [`MAX_MESSAGE_SIZE`].
fn encode_response(response: &Response) -> Vec<u8> {
    match response.to_json() {
        Ok(json) if json.len() <= MAX_MESSAGE_SIZE => json.into_bytes(),
        Ok(json) => {
            warn!(size = json.len(), code = error_codes::GENERAL, "Response exceeds message limit");
            UNENCODABLE_RESPONSE.as_bytes().to_vec()
        }
        Err(e) => {
            error!(error = %e, "Response serialization failed");
            UNENCODABLE_RESPONSE.as_bytes().to_vec()
        }
    }
}
