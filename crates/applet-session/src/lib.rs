//! Applet lifecycle control for the OpLauncher host.
//!
//! One [`AppletSession`] exists per process. Both ingress paths, the
//! native-messaging channel and the TCP control channel, feed commands
//! through a [`Dispatcher`] into that single session, whose lock is the
//! only synchronisation point between them.

mod dispatcher;
mod engine;
mod session;

pub use dispatcher::{ControlSecurity, Dispatcher, PrimaryExit};
pub use engine::{EngineError, EngineReply, ExecutionEngine, ExecutionHandle};
pub use session::{AppletSession, AppletState, SessionError, SessionSnapshot};
