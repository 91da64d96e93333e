//! HTTP-API credential-provider style gatherer: GETs a JSON document shaped
//! `{"Content": ..., "UserName": ...}` and remaps it to `{password, user}`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{BindError, Result};
use crate::secrets::http_tls::{self, TlsConfig};
use crate::template::Value;

pub struct HttpCredConfig {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize)]
struct CyberArkApiResponse {
    #[serde(rename = "Content")]
    content: String,
    #[serde(rename = "UserName")]
    username: String,
}

pub fn fetch(config: &HttpCredConfig) -> Result<Value> {
    let client = http_tls::build_client(&config.tls, std::time::Duration::from_secs(10))?;
    let body = http_tls::get(&client, "cyberark-api", &config.url, &config.headers)?;
    let parsed: CyberArkApiResponse = serde_json::from_str(&body)
        .map_err(|e| BindError::provider("cyberark-api", format!("invalid response (expected Content/UserName): {e}")))?;

    let mut map = BTreeMap::new();
    map.insert("password".to_string(), Value::Scalar(parsed.content));
    map.insert("user".to_string(), Value::Scalar(parsed.username));
    Ok(Value::Map(map))
}
