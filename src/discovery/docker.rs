//! Container enumerator: lists running Docker containers via the local
//! daemon's HTTP API and turns each into a `Discovery`.
//!
//! The daemon is normally reached over a Unix domain socket
//! (`unix:///var/run/docker.sock`); `reqwest` has no transport for that, so
//! for the Unix case we write a minimal HTTP/1.1 GET by hand over a
//! `UnixStream` (the whole engine is synchronous, so this is a plain
//! blocking call, no different in shape from the `reqwest` call the TCP
//! branch makes). `DOCKER_HOST=tcp://...` / `http://...` goes through the
//! shared blocking `reqwest::Client` instead.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::discovery::{default_entity_rewrite, ports::{self, PortEntry}, promote};
use crate::error::{BindError, Result};
use crate::matcher::Matcher;
use crate::naming;
use crate::values::Discovery;

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_API_VERSION: &str = "1.41";
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DockerConfig {
    pub matcher: Matcher,
    pub api_version: String,
}

impl DockerConfig {
    pub fn new(raw_match: &BTreeMap<String, String>, api_version: Option<String>) -> Result<DockerConfig> {
        Ok(DockerConfig {
            matcher: Matcher::new(raw_match)?,
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Port {
    #[serde(rename = "IP")]
    ip: Option<String>,
    #[serde(rename = "PrivatePort")]
    private_port: u16,
    #[serde(rename = "PublicPort")]
    public_port: Option<u16>,
    #[serde(rename = "Type")]
    port_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkEndpoint {
    #[serde(rename = "IPAddress")]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkSettingsSummary {
    #[serde(rename = "Networks", default)]
    networks: BTreeMap<String, NetworkEndpoint>,
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "ImageID", default)]
    image_id: String,
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
    #[serde(rename = "Ports", default)]
    ports: Vec<Port>,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: NetworkSettingsSummary,
}

pub fn fetch(config: &DockerConfig) -> Result<Vec<Discovery>> {
    let path = format!("/v{}/containers/json?all=false", config.api_version);
    let body = get(&path)?;
    let summaries: Vec<ContainerSummary> = serde_json::from_str(&body)
        .map_err(|e| BindError::provider("docker", format!("invalid containers/json response: {e}")))?;

    let mut out = Vec::new();
    for c in summaries {
        let mut attrs = BTreeMap::new();
        let name = c.names.first().map(|n| n.trim_start_matches('/').to_string()).unwrap_or_default();
        attrs.insert(naming::name(), name.clone());
        attrs.insert(naming::image(), c.image.clone());
        attrs.insert(naming::image_id(), c.image_id.clone());
        attrs.insert(naming::container_id(), c.id.chars().take(12).collect::<String>());
        for (k, v) in &c.labels {
            attrs.insert(naming::label(k), v.clone());
        }
        if let Some(private_ip) = c.network_settings.networks.values().find_map(|n| n.ip_address.clone()).filter(|s| !s.is_empty()) {
            attrs.insert(naming::private_ip(), private_ip);
        }

        let port_entries: Vec<PortEntry> = c.ports.iter().map(|p| PortEntry {
            private_port: p.private_port,
            public_port: p.public_port.unwrap_or(0),
            bind_ip: p.ip.clone(),
            protocol: p.port_type.clone(),
        }).collect();
        attrs.extend(ports::apply(&port_entries));

        debug!("docker: candidate container {} ({})", name, c.id);
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

enum Host {
    Unix(String),
    Tcp(String),
}

fn resolve_host() -> Host {
    match std::env::var("DOCKER_HOST") {
        Ok(h) if h.starts_with("unix://") => Host::Unix(h.trim_start_matches("unix://").to_string()),
        Ok(h) if h.starts_with("tcp://") => Host::Tcp(h.trim_start_matches("tcp://").to_string()),
        Ok(h) if h.starts_with("http://") || h.starts_with("https://") => Host::Tcp(h),
        _ => Host::Unix(DEFAULT_SOCKET.to_string()),
    }
}

fn get(path: &str) -> Result<String> {
    match resolve_host() {
        Host::Unix(socket) => get_unix(&socket, path),
        Host::Tcp(addr) => get_tcp(&addr, path),
    }
}

#[cfg(unix)]
fn get_unix(socket_path: &str, path: &str) -> Result<String> {
    use std::os::unix::net::UnixStream;

    let mut stream = UnixStream::connect(socket_path)
        .map_err(|e| BindError::provider("docker", format!("cannot connect to {socket_path}: {e}")))?;
    stream.set_read_timeout(Some(READ_TIMEOUT)).ok();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())
        .map_err(|e| BindError::provider("docker", format!("write failed: {e}")))?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)
        .map_err(|e| BindError::provider("docker", format!("read failed: {e}")))?;
    decode_http_response(&raw)
}

#[cfg(not(unix))]
fn get_unix(_socket_path: &str, _path: &str) -> Result<String> {
    Err(BindError::provider("docker", "unix sockets are not supported on this platform"))
}

fn get_tcp(addr: &str, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr)
        .map_err(|e| BindError::provider("docker", format!("cannot connect to {addr}: {e}")))?;
    stream.set_read_timeout(Some(READ_TIMEOUT)).ok();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())
        .map_err(|e| BindError::provider("docker", format!("write failed: {e}")))?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)
        .map_err(|e| BindError::provider("docker", format!("read failed: {e}")))?;
    decode_http_response(&raw)
}

/// Splits header and body on the raw byte stream (not a lossy-decoded
/// string) so a multi-byte UTF-8 value straddling the header/body boundary,
/// or a chunk boundary below, never gets sliced mid-character.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_http_response(raw: &[u8]) -> Result<String> {
    let split_at = find_subslice(raw, b"\r\n\r\n")
        .ok_or_else(|| BindError::provider("docker", "malformed HTTP response"))?;
    let head = &raw[..split_at];
    let body = &raw[split_at + 4..];

    let head_text = String::from_utf8_lossy(head);
    let status_line = head_text.lines().next().unwrap_or("");
    let status_code: u16 = status_line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    if !(200..=299).contains(&status_code) {
        return Err(BindError::provider("docker", format!("unexpected status: {status_line}")));
    }

    let body = if head_text.to_lowercase().contains("transfer-encoding: chunked") {
        dechunk(body)
    } else {
        body.to_vec()
    };
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Reassembles a chunked-transfer body on raw bytes. Chunk sizes are byte
/// counts, so slicing by them is only safe before any UTF-8 decoding has
/// happened — decode the assembled body once, at the end.
fn dechunk(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(pos) = find_subslice(rest, b"\r\n") {
        let size_line = std::str::from_utf8(&rest[..pos]).unwrap_or("").trim();
        let tail = &rest[pos + 2..];
        let size = usize::from_str_radix(size_line, 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        if tail.len() < size {
            out.extend_from_slice(tail);
            break;
        }
        out.extend_from_slice(&tail[..size]);
        rest = &tail[size..];
        if rest.starts_with(b"\r\n") {
            rest = &rest[2..];
        }
    }
    out
}
