use async_trait::async_trait;
use launcher_ipc::OpCode;
use thiserror::Error;

/// Opaque reference to the applet instance inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionHandle(pub String);

/// Successful engine call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineReply {
    pub message: String,
    /// Set by the engine on LOAD.
    pub handle: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine ran the operation and reported failure.
    #[error("engine rejected {op}: {message} (code {code})")]
    Rejected {
        op: OpCode,
        code: i32,
        message: String,
    },

    /// The engine could not be reached.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// The managed runtime that actually hosts the applet.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run `opcode` with positional `params`.
    async fn invoke(&self, opcode: OpCode, params: Vec<String>) -> Result<EngineReply, EngineError>;
}
