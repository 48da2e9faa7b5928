//! Wire layer of the OpLauncher host.
//!
//! This crate provides:
//! - length-prefixed native-messaging framing
//! - command parsing and opcode resolution
//! - JSON responses and their error codes
//! - the TCP control channel listener

mod error;
pub mod framing;
pub mod protocol;
mod server;
mod shutdown;

pub use error::{FrameError, IpcError, IpcResult, ParseError};
pub use framing::{FramedTransport, MAX_MESSAGE_SIZE};
pub use protocol::{error_codes, parse, Command, OpCode, Response};
pub use server::{ControlHandler, ControlServer};
pub use shutdown::ShutdownSignal;
