//! Applet lifecycle state machine.
//!
//! ```text
//! UNINITIALIZED --LOAD--> LOADED --UNLOAD--> UNLOADED
//!       \______________UNLOAD_______________/
//! ```
//!
//! Every transition, including the engine call it makes, runs while the
//! session lock is held, so two racing LOADs can never both see
//! `Uninitialized`.

use crate::{EngineError, ExecutionEngine, ExecutionHandle};
use launcher_ipc::{error_codes, Command, OpCode, ParseError, ShutdownSignal};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppletState {
    Uninitialized,
    Loaded,
    Unloaded,
}

impl fmt::Display for AppletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppletState::Uninitialized => "uninitialized",
            AppletState::Loaded => "loaded",
            AppletState::Unloaded => "unloaded",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unsupported operation: {0:?}")]
    UnsupportedOperation(String),

    #[error("cannot {op} while applet is {state}")]
    InvalidTransition { op: OpCode, state: AppletState },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SessionError {
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::UnsupportedOperation(_) => error_codes::UNSUPPORTED_OPERATION,
            SessionError::InvalidTransition { .. } => error_codes::INVALID_TRANSITION,
            SessionError::Engine(_) => error_codes::ENGINE_FAILURE,
            SessionError::Parse(e) => e.error_code(),
        }
    }
}

/// Point-in-time copy of the session fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: AppletState,
    pub class_name: Option<String>,
    pub execution_handle: Option<ExecutionHandle>,
}

struct SessionInner {
    state: AppletState,
    class_name: Option<String>,
    execution_handle: Option<ExecutionHandle>,
}

/// The single hosted applet.
pub struct AppletSession {
    inner: Mutex<SessionInner>,
    engine: Arc<dyn ExecutionEngine>,
    shutdown: ShutdownSignal,
}

impl AppletSession {
    pub fn new(engine: Arc<dyn ExecutionEngine>, shutdown: ShutdownSignal) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: AppletState::Uninitialized,
                class_name: None,
                execution_handle: None,
            }),
            engine,
            shutdown,
        }
    }

    pub async fn state(&self) -> AppletState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            state: inner.state,
            class_name: inner.class_name.clone(),
            execution_handle: inner.execution_handle.clone(),
        }
    }

    /// Apply one command. Returns the success message for the caller.
    ///
    /// Unsupported operations are rejected without waiting for the session
    /// lock, so they never queue behind a slow engine call.
    pub async fn apply(&self, command: &Command) -> Result<String, SessionError> {
        if command.opcode == OpCode::Unknown {
            return Err(unsupported(command));
        }

        let mut inner = self.inner.lock().await;
        match command.opcode {
            OpCode::Load => self.load(&mut inner, command).await,
            OpCode::Unload => self.unload(&mut inner).await,
            OpCode::Move => self.move_applet(&inner, command).await,
            OpCode::Unknown => Err(unsupported(command)),
        }
    }

    async fn load(&self, inner: &mut SessionInner, command: &Command) -> Result<String, SessionError> {
        if inner.state != AppletState::Uninitialized {
            return Err(SessionError::InvalidTransition {
                op: OpCode::Load,
                state: inner.state,
            });
        }

        let class_name = command.require_class_name()?.to_string();
        let params = command.launch_parameters()?;

        let reply = self.engine.invoke(OpCode::Load, params).await.map_err(|e| {
            warn!(class_name = %class_name, error = %e, "Applet load failed");
            e
        })?;

        info!(class_name = %class_name, "Applet loaded");
        inner.state = AppletState::Loaded;
        inner.execution_handle = Some(ExecutionHandle(
            reply.handle.unwrap_or_else(|| class_name.clone()),
        ));
        inner.class_name = Some(class_name.clone());

        Ok(non_empty(reply.message, || format!("Applet {class_name} loaded")))
    }

    /// Best-effort and terminal: the state becomes `Unloaded` whatever the
    /// engine says, and the host is told to stop.
    async fn unload(&self, inner: &mut SessionInner) -> Result<String, SessionError> {
        let message = match inner.state {
            AppletState::Unloaded => {
                return Err(SessionError::InvalidTransition {
                    op: OpCode::Unload,
                    state: inner.state,
                })
            }
            AppletState::Uninitialized => "No applet was loaded".to_string(),
            AppletState::Loaded => {
                let class_name = inner.class_name.clone().unwrap_or_default();
                let params = vec![OpCode::Unload.as_str().to_string(), class_name.clone()];
                match self.engine.invoke(OpCode::Unload, params).await {
                    Ok(reply) => non_empty(reply.message, || format!("Applet {class_name} unloaded")),
                    Err(e) => {
                        warn!(class_name = %class_name, error = %e, "Engine unload failed, marking applet unloaded anyway");
                        format!("Applet {class_name} unloaded; engine reported: {e}")
                    }
                }
            }
        };

        inner.state = AppletState::Unloaded;
        inner.execution_handle = None;
        info!("Applet session closed, signalling shutdown");
        self.shutdown.trigger();

        Ok(message)
    }

    async fn move_applet(&self, inner: &SessionInner, command: &Command) -> Result<String, SessionError> {
        if inner.state != AppletState::Loaded {
            return Err(SessionError::InvalidTransition {
                op: OpCode::Move,
                state: inner.state,
            });
        }

        let params = vec![
            OpCode::Move.as_str().to_string(),
            inner.class_name.clone().unwrap_or_default(),
            command.synthesized_params(),
        ];
        let reply = self.engine.invoke(OpCode::Move, params).await?;
        Ok(non_empty(reply.message, || "Applet moved".to_string()))
    }
}

fn unsupported(command: &Command) -> SessionError {
    SessionError::UnsupportedOperation(command.raw_op.clone().unwrap_or_default())
}

fn non_empty(message: String, fallback: impl FnOnce() -> String) -> String {
    if message.trim().is_empty() {
        fallback()
    } else {
        message
    }
}
