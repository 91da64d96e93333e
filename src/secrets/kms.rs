//! KMS-decrypt provider.
//!
//! No cloud vendor is named up front, and there's no single crate that wraps
//! all of them, so decryption is pushed behind a small `KmsClient` trait —
//! the extension point a host wires its real AWS/GCP/Azure KMS client into.
//! `LocalKmsClient` is a XOR-based test double, parallel to the Obfuscated
//! provider's cipher, used only by this module's own tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine;

use crate::error::{BindError, Result};
use crate::secrets::http_tls::{self, TlsConfig};
use crate::template::{self, Value};

/// Decrypts ciphertext bytes. Implemented by the host against its real KMS;
/// the crate ships no concrete implementation beyond `LocalKmsClient` (tests
/// only).
pub trait KmsClient {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaintextType {
    #[default]
    Plain,
    Json,
    Equal,
}

impl PlaintextType {
    pub fn parse(raw: &str) -> Result<PlaintextType> {
        match raw {
            "plain" => Ok(PlaintextType::Plain),
            "json" => Ok(PlaintextType::Json),
            "equal" => Ok(PlaintextType::Equal),
            other => Err(BindError::Load(format!("unknown KMS plaintext type '{other}' (expected plain, json, or equal)"))),
        }
    }
}

pub enum CiphertextSource {
    Data(String),
    File(PathBuf),
    Http { url: String, tls: TlsConfig },
}

pub struct KmsConfig {
    pub source: CiphertextSource,
    pub plaintext_type: PlaintextType,
    pub client: Box<dyn KmsClient + Send + Sync>,
}

fn load_ciphertext_b64(source: &CiphertextSource) -> Result<String> {
    match source {
        CiphertextSource::Data(s) => Ok(s.clone()),
        CiphertextSource::File(path) => std::fs::read_to_string(path)
            .map_err(|e| BindError::provider("kms", format!("cannot read file {}: {e}", path.display()))),
        CiphertextSource::Http { url, tls } => {
            let client = http_tls::build_client(tls, std::time::Duration::from_secs(10))?;
            http_tls::get(&client, "kms", url, &BTreeMap::new())
        }
    }
}

fn decode_plaintext(bytes: &[u8], kind: PlaintextType) -> Result<Value> {
    match kind {
        PlaintextType::Plain => Ok(Value::Scalar(String::from_utf8_lossy(bytes).into_owned())),
        PlaintextType::Json => {
            let parsed: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| BindError::provider("kms", format!("plaintext is not valid JSON: {e}")))?;
            Ok(template::from_json(&parsed))
        }
        PlaintextType::Equal => {
            let text = String::from_utf8_lossy(bytes);
            let mut map = BTreeMap::new();
            for pair in text.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (k, v) = pair.split_once('=')
                    .ok_or_else(|| BindError::provider("kms", format!("malformed k=v pair '{pair}' in equal-form plaintext")))?;
                map.insert(k.trim().to_string(), Value::Scalar(v.trim().to_string()));
            }
            Ok(Value::Map(map))
        }
    }
}

pub fn fetch(config: &KmsConfig) -> Result<Value> {
    let b64 = load_ciphertext_b64(&config.source)?;
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| BindError::provider("kms", format!("invalid base64 ciphertext: {e}")))?;
    let plaintext = config.client.decrypt(&ciphertext)?;
    decode_plaintext(&plaintext, config.plaintext_type)
}

#[cfg(test)]
pub struct LocalKmsClient {
    pub key: Vec<u8>,
}

#[cfg(test)]
impl KmsClient for LocalKmsClient {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if self.key.is_empty() {
            return Ok(ciphertext.to_vec());
        }
        Ok(ciphertext.iter().enumerate().map(|(i, b)| b ^ self.key[i % self.key.len()]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(key: &[u8], plain: &[u8]) -> String {
        let xored: Vec<u8> = plain.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect();
        base64::engine::general_purpose::STANDARD.encode(xored)
    }

    #[test]
    fn decrypts_plain_type() {
        let b64 = encrypt(b"k", b"hunter2");
        let config = KmsConfig {
            source: CiphertextSource::Data(b64),
            plaintext_type: PlaintextType::Plain,
            client: Box::new(LocalKmsClient { key: b"k".to_vec() }),
        };
        assert_eq!(fetch(&config).unwrap(), Value::Scalar("hunter2".to_string()));
    }

    #[test]
    fn decrypts_json_type() {
        let b64 = encrypt(b"k", br#"{"a":"1"}"#);
        let config = KmsConfig {
            source: CiphertextSource::Data(b64),
            plaintext_type: PlaintextType::Json,
            client: Box::new(LocalKmsClient { key: b"k".to_vec() }),
        };
        match fetch(&config).unwrap() {
            Value::Map(m) => assert_eq!(m["a"], Value::Scalar("1".to_string())),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn decrypts_equal_type() {
        let b64 = encrypt(b"k", b"a=1,b=2");
        let config = KmsConfig {
            source: CiphertextSource::Data(b64),
            plaintext_type: PlaintextType::Equal,
            client: Box::new(LocalKmsClient { key: b"k".to_vec() }),
        };
        match fetch(&config).unwrap() {
            Value::Map(m) => {
                assert_eq!(m["a"], Value::Scalar("1".to_string()));
                assert_eq!(m["b"], Value::Scalar("2".to_string()));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn reads_ciphertext_from_file() {
        let b64 = encrypt(b"k", b"hunter2");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ciphertext.b64");
        std::fs::write(&path, &b64).unwrap();
        let config = KmsConfig {
            source: CiphertextSource::File(path),
            plaintext_type: PlaintextType::Plain,
            client: Box::new(LocalKmsClient { key: b"k".to_vec() }),
        };
        assert_eq!(fetch(&config).unwrap(), Value::Scalar("hunter2".to_string()));
    }

    #[test]
    fn rejects_unknown_plaintext_type() {
        assert!(PlaintextType::parse("bogus").is_err());
    }
}
