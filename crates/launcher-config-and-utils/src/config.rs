//! Configuration Store adapters.
//!
//! Settings are addressed by `(section, key)`. Values are always handed out
//! as strings; typed access goes through the helper methods on
//! [`ConfigStore`].

use crate::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Read access to named settings.
pub trait ConfigStore: Send + Sync {
    /// Look up a raw value. `Ok(None)` when the section or key is absent.
    fn get(&self, section: &str, key: &str) -> CoreResult<Option<String>>;

    /// String value with a fallback for absent keys.
    fn get_string(&self, section: &str, key: &str, default: &str) -> CoreResult<String> {
        Ok(self
            .get(section, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Integer value with a fallback for absent keys.
    ///
    /// A present but non-numeric value is a configuration error.
    fn get_int(&self, section: &str, key: &str, default: i64) -> CoreResult<i64> {
        match self.get(section, key)? {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                CoreError::Config(format!("{section}.{key} is not an integer: {raw:?}"))
            }),
            None => Ok(default),
        }
    }

    /// Boolean flag with a fallback for absent keys. See [`crate::parse_flag`].
    fn get_flag(&self, section: &str, key: &str, default: bool) -> CoreResult<bool> {
        Ok(self
            .get(section, key)?
            .map(|raw| crate::parse_flag(&raw))
            .unwrap_or(default))
    }
}

/// JSON-file-backed store: a top-level object of sections, each an object
/// of scalar values.
///
/// ```json
/// { "op_server": { "enabled": "yes", "port": 3333 } }
/// ```
pub struct JsonConfigStore {
    sections: Map<String, Value>,
}

impl JsonConfigStore {
    /// Open the store at `path`, writing `defaults` there first if the file
    /// does not exist yet.
    pub fn open_or_create(path: &Path, defaults: &Value) -> CoreResult<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(defaults)?)?;
            info!(path = %path.display(), "Created default configuration");
        }
        Self::open(path)
    }

    /// Open an existing configuration file.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&content)?;
        let sections = match root {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::Config(format!(
                    "{} must contain a JSON object",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), sections = sections.len(), "Loaded configuration");

        Ok(Self { sections })
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, section: &str, key: &str) -> CoreResult<Option<String>> {
        let value = match self.sections.get(section) {
            Some(Value::Object(map)) => map.get(key),
            Some(_) => {
                return Err(CoreError::Config(format!(
                    "section {section} is not an object"
                )))
            }
            None => None,
        };

        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(CoreError::Config(format!(
                "{section}.{key} must be a scalar value"
            ))),
        }
    }
}

/// In-memory store, mainly for tests and embedding.
#[derive(Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, section: &str, key: &str, value: &str) -> Self {
        self.values
            .write()
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, section: &str, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .values
            .read()
            .get(&(section.to_string(), key.to_string()))
            .cloned())
    }
}
