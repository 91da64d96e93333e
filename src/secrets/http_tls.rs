//! Shared TLS HTTP client builder, used by every HTTP-backed provider
//! (vault, kms http, command http, cli/http credential-provider style).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BindError, Result};

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
    pub ca_bundle_file: Option<PathBuf>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
}

fn parse_version(v: &str) -> Result<reqwest::tls::Version> {
    match v {
        "1.0" => Ok(reqwest::tls::Version::TLS_1_0),
        "1.1" => Ok(reqwest::tls::Version::TLS_1_1),
        "1.2" => Ok(reqwest::tls::Version::TLS_1_2),
        "1.3" => Ok(reqwest::tls::Version::TLS_1_3),
        other => Err(BindError::provider("http", format!("unsupported TLS version '{other}'"))),
    }
}

pub fn build_client(tls: &TlsConfig, timeout: Duration) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder().timeout(timeout);

    if tls.skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(min) = &tls.min_version {
        builder = builder.min_tls_version(parse_version(min)?);
    }
    if let Some(max) = &tls.max_version {
        builder = builder.max_tls_version(parse_version(max)?);
    }
    if let Some(ca_path) = &tls.ca_bundle_file {
        let pem = std::fs::read(ca_path).map_err(|e| BindError::provider("http", format!("cannot read CA bundle {}: {e}", ca_path.display())))?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| BindError::provider("http", e))?;
        builder = builder.add_root_certificate(cert);
    }
    if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_file, &tls.client_key_file) {
        let mut combined = std::fs::read(cert_path).map_err(|e| BindError::provider("http", format!("cannot read client cert {}: {e}", cert_path.display())))?;
        combined.extend_from_slice(&std::fs::read(key_path).map_err(|e| BindError::provider("http", format!("cannot read client key {}: {e}", key_path.display())))?);
        let identity = reqwest::Identity::from_pem(&combined).map_err(|e| BindError::provider("http", e))?;
        builder = builder.identity(identity);
    }

    builder.build().map_err(|e| BindError::provider("http", e))
}

/// GET `url` with `headers` applied, erroring on a non-2xx response with
/// the status line.
pub fn get(client: &reqwest::blocking::Client, provider: &str, url: &str, headers: &BTreeMap<String, String>) -> Result<String> {
    let mut req = client.get(url);
    for (k, v) in headers {
        req = req.header(k.as_str(), v.as_str());
    }
    let resp = req.send().map_err(|e| BindError::provider(provider, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(BindError::provider(provider, format!("unexpected HTTP status {status} from {url}")));
    }
    resp.text().map_err(|e| BindError::provider(provider, e))
}
