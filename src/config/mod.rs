//! Configuration loader: `{{ NAME }}` environment placeholder expansion
//! over raw YAML text, followed by deserialization into a `Sources`, plus
//! the top-level "key set" bookkeeping callers use to distinguish an
//! omitted key from an explicit zero value.

pub mod wire;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::discovery::{command::CommandConfig, docker::DockerConfig, fargate::FargateConfig, Discoverer, DiscovererConfig};
use crate::duration;
use crate::error::{BindError, Result};
use crate::secrets::cli_cred::CliCredConfig;
use crate::secrets::command::{CommandSecretConfig, PassthroughEntry};
use crate::secrets::http_cred::HttpCredConfig;
use crate::secrets::http_tls::TlsConfig;
use crate::secrets::kms::{CiphertextSource, KmsClient, KmsConfig, PlaintextType};
use crate::secrets::obfuscated::ObfuscatedConfig;
use crate::secrets::vault::VaultConfig;
use crate::secrets::{Gatherer, GathererConfig};
use crate::sources::{check_no_duplicate_names, Sources};

/// Parse `raw` as a URL purely to validate it eagerly at load time (a
/// malformed `http.url` should fail config loading, not the first Fetch);
/// the validated `String` form is what every HTTP-backed provider actually
/// dials, since `reqwest` re-parses it itself.
fn validate_url(field: &str, raw: String) -> Result<String> {
    url::Url::parse(&raw).map_err(|e| BindError::Load(format!("invalid URL in '{field}': {e}")))?;
    Ok(raw)
}

fn placeholder_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("static env-placeholder regex"))
}

/// Substitute every `{{ NAME }}` in raw config text with the named
/// environment variable's value. Numeric values substitute unquoted;
/// anything else is double-quoted so the downstream YAML parser treats it
/// as a string. A name with no matching environment variable is a fatal
/// load error.
pub fn expand_env_placeholders(raw: &str) -> Result<String> {
    let re = placeholder_re();
    let mut first_err: Option<String> = None;
    let out = re.replace_all(raw, |caps: &regex::Captures| {
        if first_err.is_some() {
            return String::new();
        }
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => {
                if value.trim().parse::<f64>().is_ok() {
                    value
                } else {
                    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
                }
            }
            Err(_) => {
                first_err = Some(name.to_string());
                String::new()
            }
        }
    });
    match first_err {
        Some(name) => Err(BindError::Load(format!("environment variable '{name}' referenced by '{{{{ {name} }}}}' is not set"))),
        None => Ok(out.into_owned()),
    }
}

/// Which top-level keys were actually present in the raw document, so
/// callers can distinguish "key omitted" from "key present with a zero
/// value".
pub fn top_level_key_set(expanded: &str) -> Result<BTreeSet<String>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(expanded).map_err(|e| BindError::Load(format!("invalid YAML: {e}")))?;
    match doc {
        serde_yaml::Value::Mapping(map) => Ok(map.keys().filter_map(|k| k.as_str().map(String::from)).collect()),
        serde_yaml::Value::Null => Ok(BTreeSet::new()),
        _ => Err(BindError::Load("top-level config document must be a mapping".to_string())),
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
struct RawTls {
    #[serde(default)]
    skip_verify: bool,
    min_version: Option<String>,
    max_version: Option<String>,
    ca_bundle_file: Option<PathBuf>,
    client_cert_file: Option<PathBuf>,
    client_key_file: Option<PathBuf>,
}

impl From<RawTls> for TlsConfig {
    fn from(r: RawTls) -> TlsConfig {
        TlsConfig {
            skip_verify: r.skip_verify,
            min_version: r.min_version,
            max_version: r.max_version,
            ca_bundle_file: r.ca_bundle_file,
            client_cert_file: r.client_cert_file,
            client_key_file: r.client_key_file,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
struct RawHttp {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    tls: RawTls,
}

#[derive(Debug, Deserialize)]
struct RawVault {
    http: RawHttp,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawKms {
    data: Option<String>,
    file: Option<PathBuf>,
    http: Option<RawHttp>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawObfuscated {
    key: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct RawCommandSecret {
    path: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    passthrough_environment: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCliCred {
    cli: String,
    #[serde(rename = "app-id")]
    app_id: String,
    safe: String,
    folder: String,
    object: String,
}

#[derive(Debug, Deserialize)]
struct RawHttpCred {
    http: RawHttp,
}

#[derive(Debug, Deserialize, Default)]
struct RawVariable {
    ttl: Option<String>,
    #[serde(rename = "aws-kms")]
    aws_kms: Option<RawKms>,
    vault: Option<RawVault>,
    #[serde(rename = "cyberark-cli")]
    cyberark_cli: Option<RawCliCred>,
    #[serde(rename = "cyberark-api")]
    cyberark_api: Option<RawHttpCred>,
    obfuscated: Option<RawObfuscated>,
    command: Option<RawCommandSecret>,
}

#[derive(Debug, Deserialize)]
struct RawDocker {
    #[serde(rename = "match", default)]
    matcher: BTreeMap<String, String>,
    api_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFargate {
    #[serde(rename = "match", default)]
    matcher: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCommandDiscovery {
    exec: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    timeout: Option<String>,
    #[serde(rename = "match", default)]
    matcher: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDiscovery {
    ttl: Option<String>,
    docker: Option<RawDocker>,
    fargate: Option<RawFargate>,
    command: Option<RawCommandDiscovery>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    variables: BTreeMap<String, RawVariable>,
    discovery: Option<RawDiscovery>,
}

/// KMS decrypt needs a concrete client wired in by the host — the
/// declarative shape alone can't name one, so the loader takes it as a
/// parameter rather than discovering it from YAML.
pub fn load(raw: &[u8], kms_client_factory: &dyn Fn() -> Box<dyn KmsClient + Send + Sync>) -> Result<(Sources, BTreeSet<String>)> {
    let text = String::from_utf8_lossy(raw).into_owned();
    let expanded = expand_env_placeholders(&text)?;
    let key_set = top_level_key_set(&expanded)?;

    let parsed: RawConfig = serde_yaml::from_str(&expanded).map_err(|e| BindError::Load(format!("invalid YAML: {e}")))?;

    check_no_duplicate_names(&parsed.variables.keys().cloned().collect::<Vec<_>>())?;

    let mut variables = BTreeMap::new();
    for (name, raw_var) in parsed.variables {
        let ttl = match &raw_var.ttl {
            Some(raw) => duration::parse(raw).map_err(BindError::Load)?,
            None => duration::default_variable_ttl(),
        };
        let gatherer_config = build_gatherer_config(&name, raw_var, kms_client_factory)?;
        variables.insert(name, Gatherer::new(gatherer_config, ttl));
    }

    let discoverer = match parsed.discovery {
        Some(raw_disc) => Some(build_discoverer(raw_disc)?),
        None => None,
    };

    Ok((Sources::new(discoverer, variables), key_set))
}

fn build_gatherer_config(name: &str, raw: RawVariable, kms_client_factory: &dyn Fn() -> Box<dyn KmsClient + Send + Sync>) -> Result<GathererConfig> {
    let mut present = Vec::new();
    if raw.aws_kms.is_some() { present.push("aws-kms"); }
    if raw.vault.is_some() { present.push("vault"); }
    if raw.cyberark_cli.is_some() { present.push("cyberark-cli"); }
    if raw.cyberark_api.is_some() { present.push("cyberark-api"); }
    if raw.obfuscated.is_some() { present.push("obfuscated"); }
    if raw.command.is_some() { present.push("command"); }

    match present.len() {
        0 => Err(BindError::Load(format!("variable '{name}' has no provider configured"))),
        1 => {}
        _ => return Err(BindError::Load(format!("variable '{name}' configures more than one provider: {}", present.join(", ")))),
    }

    if let Some(v) = raw.vault {
        return Ok(GathererConfig::Vault(VaultConfig {
            url: validate_url(&format!("variables.{name}.vault.http.url"), v.http.url)?,
            token: v.token,
            headers: v.http.headers,
            tls: v.http.tls.into(),
        }));
    }
    if let Some(k) = raw.aws_kms {
        let source = match (k.data, k.file, k.http) {
            (Some(d), None, None) => CiphertextSource::Data(d),
            (None, Some(f), None) => CiphertextSource::File(f),
            (None, None, Some(h)) => CiphertextSource::Http {
                url: validate_url(&format!("variables.{name}.aws-kms.http.url"), h.url)?,
                tls: h.tls.into(),
            },
            _ => return Err(BindError::Load(format!("variable '{name}': aws-kms requires exactly one of data, file, http.url"))),
        };
        let plaintext_type = match &k.kind {
            Some(t) => PlaintextType::parse(t)?,
            None => PlaintextType::Plain,
        };
        return Ok(GathererConfig::Kms(KmsConfig { source, plaintext_type, client: kms_client_factory() }));
    }
    if let Some(o) = raw.obfuscated {
        return Ok(GathererConfig::Obfuscated(ObfuscatedConfig { key: o.key, secret: o.secret }));
    }
    if let Some(c) = raw.command {
        let mut entries = Vec::with_capacity(c.passthrough_environment.len());
        for e in &c.passthrough_environment {
            entries.push(PassthroughEntry::parse(e)?);
        }
        return Ok(GathererConfig::Command(CommandSecretConfig::new(c.path, c.args, entries, None)));
    }
    if let Some(c) = raw.cyberark_cli {
        return Ok(GathererConfig::CliCred(CliCredConfig::new(c.cli, c.app_id, c.safe, c.folder, c.object)));
    }
    if let Some(a) = raw.cyberark_api {
        return Ok(GathererConfig::HttpCred(HttpCredConfig {
            url: validate_url(&format!("variables.{name}.cyberark-api.http.url"), a.http.url)?,
            headers: a.http.headers,
            tls: a.http.tls.into(),
        }));
    }
    unreachable!("checked exactly one provider is present above")
}

fn build_discoverer(raw: RawDiscovery) -> Result<Discoverer> {
    let ttl = match &raw.ttl {
        Some(t) => duration::parse(t).map_err(BindError::Load)?,
        None => duration::default_discovery_ttl(),
    };

    let mut present = 0;
    if raw.docker.is_some() { present += 1; }
    if raw.fargate.is_some() { present += 1; }
    if raw.command.is_some() { present += 1; }
    if present > 1 {
        return Err(BindError::Load("discovery configures more than one kind (docker/fargate/command)".to_string()));
    }

    let config = if let Some(d) = raw.docker {
        DiscovererConfig::Docker(DockerConfig::new(&d.matcher, d.api_version)?)
    } else if let Some(f) = raw.fargate {
        DiscovererConfig::Fargate(FargateConfig::new(&f.matcher, None)?)
    } else if let Some(c) = raw.command {
        let timeout = match &c.timeout {
            Some(t) => Some(duration::parse(t).map_err(BindError::Load)?),
            None => None,
        };
        DiscovererConfig::Command(CommandConfig::new(c.exec, c.env, timeout, &c.matcher)?)
    } else {
        return Err(BindError::Load("discovery section present but names no kind (docker/fargate/command)".to_string()));
    };

    Ok(Discoverer::new(config, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_kms() -> Box<dyn KmsClient + Send + Sync> {
        struct Unused;
        impl KmsClient for Unused {
            fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>> {
                Err(BindError::provider("aws-kms", "no KMS client configured for this test"))
            }
        }
        Box::new(Unused)
    }

    #[test]
    fn expands_numeric_placeholder_unquoted_and_string_placeholder_quoted() {
        std::env::set_var("BINDCAT_CFG_TEST_BAR1", "VAL1");
        std::env::set_var("BINDCAT_CFG_TEST_BAR2", "42");
        let raw = "foo: {{ BINDCAT_CFG_TEST_BAR1 }}\nbaz: {{ BINDCAT_CFG_TEST_BAR2 }}";
        let out = expand_env_placeholders(raw).unwrap();
        assert_eq!(out, "foo: \"VAL1\"\nbaz: 42");
        std::env::remove_var("BINDCAT_CFG_TEST_BAR1");
        std::env::remove_var("BINDCAT_CFG_TEST_BAR2");
    }

    #[test]
    fn missing_env_var_is_a_load_error() {
        std::env::remove_var("BINDCAT_CFG_TEST_MISSING_SURELY");
        let raw = "foo: {{ BINDCAT_CFG_TEST_MISSING_SURELY }}";
        assert!(expand_env_placeholders(raw).is_err());
    }

    #[test]
    fn key_set_reports_only_present_top_level_keys() {
        let keys = top_level_key_set("variables:\n  a: {}\n").unwrap();
        assert!(keys.contains("variables"));
        assert!(!keys.contains("discovery"));
    }

    #[test]
    fn rejects_variable_with_two_providers() {
        let yaml = b"variables:\n  creds:\n    obfuscated: {key: k, secret: aGVsbG8=}\n    vault: {http: {url: 'http://x'}}\n";
        assert!(load(yaml, &no_kms).is_err());
    }

    #[test]
    fn rejects_variable_with_no_provider() {
        let yaml = b"variables:\n  creds: {}\n";
        assert!(load(yaml, &no_kms).is_err());
    }

    #[test]
    fn rejects_discovery_with_two_kinds() {
        let yaml = b"discovery:\n  docker: {match: {}}\n  fargate: {match: {}}\n";
        assert!(load(yaml, &no_kms).is_err());
    }

    #[test]
    fn rejects_malformed_vault_url_at_load_time() {
        let yaml = b"variables:\n  creds:\n    vault: {http: {url: 'not a url'}}\n";
        assert!(load(yaml, &no_kms).is_err());
    }

    #[test]
    fn loads_a_well_formed_config() {
        let yaml = b"variables:\n  creds:\n    ttl: 30m\n    obfuscated: {key: k, secret: aGVsbG8=}\ndiscovery:\n  docker:\n    match: {name: web}\n";
        let (sources, keys) = load(yaml, &no_kms).unwrap();
        assert!(keys.contains("variables"));
        assert!(keys.contains("discovery"));
        assert_eq!(sources.variables.len(), 1);
        assert!(sources.discoverer.is_some());
    }
}
