//! XOR-deobfuscator provider.
//!
//! Not a real secret store: `key`/`secret` are shipped inline in the
//! declarative config, base64-encoded and XORed against the key so they
//! aren't plaintext-grep-able in a checked-in manifest. Anyone with the
//! manifest can trivially reverse it; that's accepted as one of the
//! gatherer shapes, not a cryptographic guarantee.

use base64::Engine;

use crate::error::{BindError, Result};
use crate::template::{self, Value};

pub struct ObfuscatedConfig {
    pub key: String,
    pub secret: String,
}

fn xor_cycle(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
}

pub fn fetch(config: &ObfuscatedConfig) -> Result<Value> {
    let encoded = base64::engine::general_purpose::STANDARD
        .decode(config.secret.trim())
        .map_err(|e| BindError::provider("obfuscated", format!("invalid base64 in 'secret': {e}")))?;
    let plain = xor_cycle(&encoded, config.key.as_bytes());

    if let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&plain) {
        if parsed.is_object() || parsed.is_array() {
            return Ok(template::from_json(&parsed));
        }
    }
    Ok(Value::Scalar(String::from_utf8_lossy(&plain).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obfuscate(key: &str, plain: &[u8]) -> String {
        let xored = xor_cycle(plain, key.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(xored)
    }

    #[test]
    fn round_trips_a_plain_string() {
        let secret = obfuscate("k", b"hunter2");
        let config = ObfuscatedConfig { key: "k".to_string(), secret };
        assert_eq!(fetch(&config).unwrap(), Value::Scalar("hunter2".to_string()));
    }

    #[test]
    fn round_trips_a_json_object() {
        let secret = obfuscate("shared-key", br#"{"user":"admin","pass":"hunter2"}"#);
        let config = ObfuscatedConfig { key: "shared-key".to_string(), secret };
        match fetch(&config).unwrap() {
            Value::Map(m) => {
                assert_eq!(m["user"], Value::Scalar("admin".to_string()));
                assert_eq!(m["pass"], Value::Scalar("hunter2".to_string()));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let config = ObfuscatedConfig { key: "k".to_string(), secret: "not base64!!".to_string() };
        assert!(fetch(&config).is_err());
    }
}
