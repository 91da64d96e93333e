//! Command secret provider: executes `path` with an environment restricted
//! to the intersection of the host environment and a
//! `passthrough_environment` allowlist, then decodes stdout.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use regex::Regex;

use crate::duration::{self, default_command_timeout};
use crate::error::{BindError, Result};
use crate::template::{self, Value};

/// One `passthrough_environment` entry: an exact variable name, or a
/// `/regex/`-form pattern matched against variable names.
pub enum PassthroughEntry {
    Exact(String),
    Pattern(Regex),
}

impl PassthroughEntry {
    pub fn parse(raw: &str) -> Result<PassthroughEntry> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let inner = &raw[1..raw.len() - 1];
            let re = Regex::new(inner).map_err(|e| BindError::Load(format!("invalid passthrough_environment pattern '{raw}': {e}")))?;
            Ok(PassthroughEntry::Pattern(re))
        } else {
            Ok(PassthroughEntry::Exact(raw.to_string()))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            PassthroughEntry::Exact(n) => n == name,
            PassthroughEntry::Pattern(re) => re.is_match(name),
        }
    }
}

pub struct CommandSecretConfig {
    pub path: String,
    pub args: Vec<String>,
    pub passthrough_environment: Vec<PassthroughEntry>,
    pub timeout: Duration,
}

impl CommandSecretConfig {
    pub fn new(path: String, args: Vec<String>, passthrough_environment: Vec<PassthroughEntry>, timeout: Option<Duration>) -> CommandSecretConfig {
        CommandSecretConfig {
            path,
            args,
            passthrough_environment,
            timeout: timeout.unwrap_or_else(default_command_timeout),
        }
    }
}

fn passthrough_env(entries: &[PassthroughEntry]) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(name, _)| entries.iter().any(|e| e.matches(name)))
        .collect()
}

#[derive(Debug, serde::Deserialize)]
struct PreferredResponse {
    data: serde_json::Value,
    ttl: Option<String>,
}

/// Decode stdout: preferred `{"data": ..., "ttl": "..."?}` shape, else any
/// JSON object, else a raw string. Empty stdout is an error.
fn decode_response(stdout: &[u8]) -> Result<(Value, Option<Duration>)> {
    if String::from_utf8_lossy(stdout).trim().is_empty() {
        return Err(BindError::provider("command-secret", "empty response from command provider"));
    }

    if let Ok(preferred) = serde_json::from_slice::<PreferredResponse>(stdout) {
        let value = template::from_json(&preferred.data);
        let ttl = match preferred.ttl {
            Some(raw) => Some(duration::parse(&raw)
                .map_err(|e| BindError::provider("command-secret", format!("malformed 'ttl' field: {e}")))?),
            None => None,
        };
        return Ok((value, ttl));
    }

    if let Ok(any_json) = serde_json::from_slice::<serde_json::Value>(stdout) {
        if any_json.is_object() {
            return Ok((template::from_json(&any_json), None));
        }
    }

    let text = String::from_utf8_lossy(stdout).trim_end().to_string();
    Ok((Value::Scalar(text), None))
}

pub fn fetch(config: &CommandSecretConfig) -> Result<(Value, Option<Duration>)> {
    let mut cmd = Command::new(&config.path);
    cmd.args(&config.args);
    cmd.env_clear();
    cmd.envs(passthrough_env(&config.passthrough_environment));

    let output = crate::procutil::run_with_timeout(cmd, config.timeout)
        .map_err(|e| BindError::provider("command-secret", e))?;
    let output = match output {
        Some(o) => o,
        None => return Err(BindError::Timeout { provider: "command-secret".to_string(), elapsed: config.timeout }),
    };

    if !output.success {
        return Err(BindError::provider("command-secret", String::from_utf8_lossy(&output.stderr).into_owned()));
    }

    decode_response(&output.stdout)
}
