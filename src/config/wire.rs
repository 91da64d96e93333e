//! Wire config protocol: a single-line JSON message integrations send to
//! register a new binding at runtime, parsed independently of the YAML
//! loader above (its `config` payload is itself YAML-shaped declarative
//! config, just JSON-encoded on the wire).

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BindError, Result};

pub const PROTOCOL_VERSION: &str = "1";
pub const REGISTER_ACTION: &str = "register_config";

#[derive(Debug, Deserialize)]
pub struct RegisterConfig {
    pub config_protocol_version: String,
    pub action: String,
    pub config_name: String,
    pub config: RegisteredPayload,
}

#[derive(Debug, Deserialize)]
pub struct RegisteredPayload {
    #[serde(default)]
    pub variables: serde_json::Map<String, Value>,
    pub integrations: Vec<Value>,
}

/// Parse and validate one wire-protocol message. `config_name`, `action`,
/// and a non-empty `integrations` list are required.
pub fn parse_register_config(raw: &[u8]) -> Result<RegisterConfig> {
    let msg: RegisterConfig = serde_json::from_slice(raw)
        .map_err(|e| BindError::Load(format!("invalid wire config-protocol message: {e}")))?;

    if msg.config_protocol_version != PROTOCOL_VERSION {
        log::warn!("wire config-protocol message for '{}' declares version '{}', expected '{}'", msg.config_name, msg.config_protocol_version, PROTOCOL_VERSION);
    }
    if msg.action.is_empty() {
        return Err(BindError::Load("wire config-protocol message missing 'action'".to_string()));
    }
    if msg.config_name.is_empty() {
        return Err(BindError::Load("wire config-protocol message missing 'config_name'".to_string()));
    }
    if msg.config.integrations.is_empty() {
        return Err(BindError::Load(format!("wire config-protocol message for '{}' has no integrations", msg.config_name)));
    }
    if msg.action != REGISTER_ACTION {
        return Err(BindError::Load(format!("unsupported wire config-protocol action '{}'", msg.action)));
    }

    Ok(msg)
}
