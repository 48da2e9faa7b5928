//! Configuration, paths, and logging setup for the OpLauncher host.

mod config;
mod error;
mod flags;
mod logging;
mod paths;
mod settings;

pub use config::{ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use error::{CoreError, CoreResult};
pub use flags::parse_flag;
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use settings::{
    EngineSettings, HostSettings, OpServerSettings, SecuritySettings, DEFAULT_LOG_LEVEL,
    DEFAULT_OP_SERVER_PORT, DEFAULT_TOKEN_MAX_DAYS,
};
