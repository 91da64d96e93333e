//! Task-metadata enumerator: reads the ECS task metadata endpoint
//! (`$ECS_CONTAINER_METADATA_URI_V4/task`) and turns each container in the
//! task into a `Discovery`. Shares the ports policy in `ports.rs` with the
//! Docker enumerator.

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::discovery::{default_entity_rewrite, ports::{self, PortEntry}, promote};
use crate::error::{BindError, Result};
use crate::matcher::Matcher;
use crate::naming;
use crate::values::Discovery;

const METADATA_ENV_VAR: &str = "ECS_CONTAINER_METADATA_URI_V4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FargateConfig {
    pub matcher: Matcher,
    /// Overrides the `$ECS_CONTAINER_METADATA_URI_V4` environment variable;
    /// used by tests to point at a `mockito` server.
    pub endpoint_override: Option<String>,
}

impl FargateConfig {
    pub fn new(raw_match: &BTreeMap<String, String>, endpoint_override: Option<String>) -> Result<FargateConfig> {
        Ok(FargateConfig { matcher: Matcher::new(raw_match)?, endpoint_override })
    }
}

#[derive(Debug, Deserialize)]
struct TaskPort {
    #[serde(rename = "ContainerPort")]
    container_port: u16,
    #[serde(rename = "HostPort")]
    host_port: Option<u16>,
    #[serde(rename = "Protocol")]
    protocol: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TaskNetwork {
    #[serde(rename = "IPv4Addresses", default)]
    ipv4_addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskContainer {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "DockerId", default)]
    docker_id: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "ImageID", default)]
    image_id: String,
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
    #[serde(rename = "Ports", default)]
    ports: Vec<TaskPort>,
    #[serde(rename = "Networks", default)]
    networks: Vec<TaskNetwork>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "Containers", default)]
    containers: Vec<TaskContainer>,
}

pub fn fetch(config: &FargateConfig) -> Result<Vec<Discovery>> {
    let base = config.endpoint_override.clone()
        .or_else(|| std::env::var(METADATA_ENV_VAR).ok())
        .ok_or_else(|| BindError::provider("fargate", format!("{METADATA_ENV_VAR} is not set")))?;
    let url = format!("{}/task", base.trim_end_matches('/'));

    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| BindError::provider("fargate", e))?;
    let resp = client.get(&url).send().map_err(|e| BindError::provider("fargate", e))?;
    if !resp.status().is_success() {
        return Err(BindError::provider("fargate", format!("unexpected status {} from {url}", resp.status())));
    }
    let task: TaskResponse = resp.json().map_err(|e| BindError::provider("fargate", format!("invalid task metadata: {e}")))?;

    let mut out = Vec::new();
    for c in task.containers {
        let task_ip = c.networks.first().and_then(|n| n.ipv4_addresses.first().cloned());

        let mut attrs = BTreeMap::new();
        attrs.insert(naming::name(), c.name.clone());
        attrs.insert(naming::image(), c.image.clone());
        attrs.insert(naming::image_id(), c.image_id.clone());
        attrs.insert(naming::container_id(), c.docker_id.chars().take(12).collect::<String>());
        for (k, v) in &c.labels {
            attrs.insert(naming::label(k), v.clone());
        }
        if let Some(ip) = &task_ip {
            attrs.insert(naming::private_ip(), ip.clone());
        }

        let port_entries: Vec<PortEntry> = c.ports.iter().map(|p| PortEntry {
            private_port: p.container_port,
            public_port: p.host_port.unwrap_or(0),
            bind_ip: task_ip.clone(),
            protocol: p.protocol.as_ref().map(|s| s.to_lowercase()),
        }).collect();
        attrs.extend(ports::apply(&port_entries));

        debug!("fargate: candidate container {} ({})", c.name, c.docker_id);
        if !config.matcher.all(&attrs) {
            continue;
        }

        out.push(Discovery {
            variables: promote(attrs),
            annotations: BTreeMap::new(),
            entity_rewrites: vec![default_entity_rewrite()],
        });
    }
    Ok(out)
}
