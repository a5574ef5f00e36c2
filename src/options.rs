//! Construction options for a configuration handle.
//!
//! All fields have defaults so options can be built with struct update
//! syntax or deserialized from a partial document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::ConfigError;

/// Options controlling how a [`ConfigHandle`](crate::ConfigHandle) behaves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigOptions {
    /// Synthesize the file from a default payload when it does not exist.
    pub create_on_no_entry: bool,

    /// Watch the file and reload on external edits after a successful read.
    pub auto_reload: bool,

    /// Schedule a lazy write after every successful `set`.
    pub write_on_set: bool,

    /// Debounce window for file change notifications, in milliseconds.
    pub reload_delay_ms: u64,

    /// Schema used when no `<name>.schema.json` sits next to the file.
    pub default_schema: Option<Value>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            create_on_no_entry: false,
            auto_reload: false,
            write_on_set: false,
            reload_delay_ms: 500,
            default_schema: None,
        }
    }
}

impl ConfigOptions {
    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        match &self.default_schema {
            Some(schema) if !schema.is_object() => Err(ConfigError::Argument(
                "default_schema must be a JSON object".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
