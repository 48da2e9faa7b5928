//! IPC error types.

use crate::protocol::error_codes;
use std::net::SocketAddr;
use thiserror::Error;

/// Failure on the length-prefixed channel.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Declared payload exceeds the channel limit. The channel is unusable.
    #[error("message of {declared} bytes exceeds the {max} byte limit")]
    TooLarge { declared: usize, max: usize },

    #[error("failed to read message: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("failed to write message: {0}")]
    WriteFailed(#[source] std::io::Error),
}

impl FrameError {
    pub fn error_code(&self) -> i32 {
        match self {
            FrameError::TooLarge { .. } => error_codes::FRAME_TOO_LARGE,
            FrameError::ReadFailed(_) => error_codes::FRAME_READ_FAILED,
            FrameError::WriteFailed(_) => error_codes::GENERAL,
        }
    }
}

/// A command that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("message must be a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ParseError {
    pub fn error_code(&self) -> i32 {
        match self {
            ParseError::MissingField(_) => error_codes::MISSING_FIELD,
            _ => error_codes::PARSE_ERROR,
        }
    }
}

/// IPC error type.
#[derive(Error, Debug)]
pub enum IpcError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Listener could not be set up
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using IpcError.
pub type IpcResult<T> = Result<T, IpcError>;
