//! Command enumerator: launches a user-specified executable, decodes its
//! stdout as a JSON array of discoveries.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::discovery::promote;
use crate::duration::default_command_timeout;
use crate::error::{BindError, Result};
use crate::matcher::Matcher;
use crate::naming;
use crate::values::{Discovery, EntityRewrite};

pub struct CommandConfig {
    /// Run through `sh -c`, so this may embed arguments/pipelines.
    pub exec: String,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub matcher: Matcher,
}

impl CommandConfig {
    pub fn new(exec: String, env: BTreeMap<String, String>, timeout: Option<Duration>, raw_match: &BTreeMap<String, String>) -> Result<CommandConfig> {
        Ok(CommandConfig {
            exec,
            env,
            timeout: timeout.unwrap_or_else(default_command_timeout),
            matcher: Matcher::new(raw_match)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawRewrite {
    action: String,
    #[serde(rename = "match")]
    r#match: String,
    #[serde(rename = "replaceField")]
    replace_field: String,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(rename = "metricAnnotations", default)]
    metric_annotations: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "entityRewrites", default)]
    entity_rewrites: Vec<RawRewrite>,
}

pub fn fetch(config: &CommandConfig) -> Result<Vec<Discovery>> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&config.exec);
    for (k, v) in &config.env {
        cmd.env(k, v);
    }

    let output = crate::procutil::run_with_timeout(cmd, config.timeout)
        .map_err(|e| BindError::provider("command-discovery", e))?;
    let output = match output {
        Some(o) => o,
        None => return Err(BindError::Timeout { provider: "command-discovery".to_string(), elapsed: config.timeout }),
    };

    if !output.success {
        return Err(BindError::provider("command-discovery", String::from_utf8_lossy(&output.stderr).into_owned()));
    }

    let entries: Vec<RawEntry> = serde_json::from_slice(&output.stdout)
        .map_err(|e| BindError::provider("command-discovery", format!("invalid JSON from discovery command: {e}")))?;

    let mut out = Vec::new();
    for entry in entries {
        let attrs = promote(entry.variables);
        if !config.matcher.all(&attrs) {
            continue;
        }
        let entity_rewrites = entry.entity_rewrites.into_iter().map(|r| EntityRewrite {
            action: r.action,
            r#match: r.r#match,
            replace_field: r.replace_field,
        }).collect();
        let annotations = entry.metric_annotations.into_iter()
            .map(|(k, v)| (k, crate::template::from_json(&v)))
            .collect();
        out.push(Discovery { variables: attrs, annotations, entity_rewrites });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn empty_match() -> BTreeMap<String, String> { BTreeMap::new() }

    #[test]
    fn parses_well_formed_discovery_json() {
        let script = r#"echo '[{"variables":{"region":"us-east-1"},"metricAnnotations":{"az":"1a"},"entityRewrites":[{"action":"replace","match":"${ip}","replaceField":"container:${containerId}"}]}]'"#;
        let config = CommandConfig::new(script.to_string(), BTreeMap::new(), None, &empty_match()).unwrap();
        let discoveries = fetch(&config).unwrap();
        assert_eq!(discoveries.len(), 1);
        assert_eq!(discoveries[0].variables[&naming::inject_prefix(naming::DISCOVERY_PREFIX, "region")], "us-east-1");
        assert_eq!(discoveries[0].entity_rewrites[0].action, "replace");
    }

    #[test]
    fn times_out_and_is_reaped() {
        let config = CommandConfig::new("sleep 1".to_string(), BTreeMap::new(), Some(Duration::from_millis(1)), &empty_match()).unwrap();
        let err = fetch(&config).unwrap_err();
        match err {
            BindError::Timeout { .. } => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_wraps_stderr() {
        let config = CommandConfig::new("echo boom 1>&2; exit 1".to_string(), BTreeMap::new(), None, &empty_match()).unwrap();
        let err = fetch(&config).unwrap_err();
        match err {
            BindError::Provider { detail, .. } => assert!(detail.contains("boom")),
            other => panic!("expected Provider, got {other:?}"),
        }
    }

    #[test]
    fn non_matching_discovery_is_discarded() {
        let script = r#"echo '[{"variables":{"region":"eu-west-1"}}]'"#;
        let mut m = BTreeMap::new();
        m.insert("discovery.region".to_string(), "us-east-1".to_string());
        let config = CommandConfig::new(script.to_string(), BTreeMap::new(), None, &m).unwrap();
        assert_eq!(fetch(&config).unwrap().len(), 0);
    }
}
