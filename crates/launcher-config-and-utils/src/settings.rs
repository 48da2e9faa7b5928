//! Typed view over the Configuration Store, read once at startup.

use crate::{ConfigStore, CoreError, CoreResult};
use serde_json::{json, Value};

/// Default TCP control channel port.
pub const DEFAULT_OP_SERVER_PORT: u16 = 3333;

/// Default maximum token age in days before rotation.
pub const DEFAULT_TOKEN_MAX_DAYS: i64 = 30;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_ENGINE_COMMAND: &str = "oplauncher-engine";

const SECTION_OP_SERVER: &str = "op_server";
const SECTION_SECURITY: &str = "security";
const SECTION_LOGGING: &str = "logging";
const SECTION_ENGINE: &str = "engine";

/// TCP control channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpServerSettings {
    pub enabled: bool,
    pub port: u16,
}

/// Token and envelope settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    pub token_max_days: i64,
    /// When false the control channel accepts plain JSON commands.
    pub secure_payload: bool,
}

/// How to start the Execution Engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub command: String,
    pub args: Vec<String>,
}

/// All settings the host needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub op_server: OpServerSettings,
    pub security: SecuritySettings,
    pub engine: EngineSettings,
    pub log_level: String,
}

impl HostSettings {
    /// Read every setting from `store`, then apply environment overrides.
    pub fn from_store(store: &dyn ConfigStore) -> CoreResult<Self> {
        let port = store.get_int(
            SECTION_OP_SERVER,
            "port",
            i64::from(DEFAULT_OP_SERVER_PORT),
        )?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| CoreError::Config(format!("op_server.port out of range: {port}")))?;

        let token_max_days =
            store.get_int(SECTION_SECURITY, "token_max_days", DEFAULT_TOKEN_MAX_DAYS)?;
        if token_max_days < 0 {
            return Err(CoreError::Config(format!(
                "security.token_max_days must not be negative: {token_max_days}"
            )));
        }

        let mut settings = Self {
            op_server: OpServerSettings {
                enabled: store.get_flag(SECTION_OP_SERVER, "enabled", false)?,
                port,
            },
            security: SecuritySettings {
                token_max_days,
                secure_payload: store.get_flag(SECTION_SECURITY, "secure_payload", true)?,
            },
            engine: EngineSettings {
                command: store.get_string(SECTION_ENGINE, "command", DEFAULT_ENGINE_COMMAND)?,
                args: store
                    .get_string(SECTION_ENGINE, "args", "")?
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            },
            log_level: store.get_string(SECTION_LOGGING, "level", DEFAULT_LOG_LEVEL)?,
        };
        settings.load_from_env();
        Ok(settings)
    }

    /// Contents written to a fresh configuration file.
    pub fn default_document() -> Value {
        json!({
            SECTION_OP_SERVER: {
                "enabled": "false",
                "port": DEFAULT_OP_SERVER_PORT.to_string(),
            },
            SECTION_SECURITY: {
                "token_max_days": DEFAULT_TOKEN_MAX_DAYS.to_string(),
                "secure_payload": "true",
            },
            SECTION_LOGGING: {
                "level": DEFAULT_LOG_LEVEL,
            },
            SECTION_ENGINE: {
                "command": DEFAULT_ENGINE_COMMAND,
                "args": "",
            },
        })
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("OPLAUNCHER_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }
}
