//! HTTP-vault provider.
//!
//! An authenticated GET against a versioned or unversioned KV store, decoded
//! from the same `{"data": {...}}` (and, for KV v2, `{"data": {"data":
//! {...}}}`) envelope Vault's API always uses.

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;

use crate::error::{BindError, Result};
use crate::secrets::http_tls::{self, TlsConfig};
use crate::template::{self, Value};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_HEADER: &str = "X-Vault-Token";

pub struct VaultConfig {
    pub url: String,
    pub token: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub tls: TlsConfig,
}

pub fn fetch(config: &VaultConfig) -> Result<Value> {
    debug!("vault: GET {}", config.url);
    let client = http_tls::build_client(&config.tls, DEFAULT_TIMEOUT)?;

    let mut headers = config.headers.clone();
    if let Some(token) = &config.token {
        headers.insert(TOKEN_HEADER.to_string(), token.clone());
    }

    let body = http_tls::get(&client, "vault", &config.url, &headers)?;
    let parsed: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| BindError::provider("vault", format!("invalid JSON response: {e}")))?;

    let data = parsed.get("data").ok_or_else(|| BindError::provider("vault", "response has no 'data' key"))?;

    // KV v2 (versioned store): data.data is the value.
    if let Some(versioned) = data.get("data") {
        if versioned.is_object() {
            return Ok(template::from_json(versioned));
        }
    }
    // KV v1: data itself is the value, if it's a map.
    if data.is_object() {
        return Ok(template::from_json(data));
    }

    Err(BindError::provider("vault", "response 'data' is neither a versioned store nor a flat map"))
}
