//! Canonical discovery key names and placeholder-name helpers used by the
//! entity-rewrite prefix injection.

pub const DISCOVERY_PREFIX: &str = "discovery";

pub fn ip() -> String { "ip".into() }
pub fn port() -> String { "port".into() }
pub fn private_ip() -> String { "private.ip".into() }
pub fn private_port() -> String { "private.port".into() }
pub fn name() -> String { "name".into() }
pub fn image() -> String { "image".into() }
pub fn image_id() -> String { "imageId".into() }
pub fn container_id() -> String { "containerId".into() }

pub fn label(key: &str) -> String { format!("label.{}", key) }

pub fn ports_index(i: usize) -> String { format!("ports.{}", i) }
pub fn private_ports_index(i: usize) -> String { format!("private.ports.{}", i) }
pub fn ports_proto(proto: &str) -> String { format!("ports.{}", proto) }
pub fn private_ports_proto(proto: &str) -> String { format!("private.ports.{}", proto) }
pub fn ports_proto_index(proto: &str, idx: usize) -> String { format!("ports.{}.{}", proto, idx) }
pub fn private_ports_proto_index(proto: &str, idx: usize) -> String { format!("private.ports.{}.{}", proto, idx) }

/// Wrap a bare name in `${...}` placeholder form.
pub fn as_placeholder(name: &str) -> String {
    format!("${{{}}}", name)
}

/// Promote a bare name under a prefix if it doesn't already carry one.
///
/// `inject("discovery", "ip") == "discovery.ip"`; `inject("discovery",
/// "discovery.ip")` is idempotent.
pub fn inject_prefix(prefix: &str, bare_name: &str) -> String {
    if bare_name.starts_with(&format!("{}.", prefix)) || bare_name == prefix {
        bare_name.to_string()
    } else {
        format!("{}.{}", prefix, bare_name)
    }
}

/// Apply `inject_prefix` to every bare `${name}` placeholder occurrence
/// inside a string, leaving already-prefixed or unrelated text untouched.
pub fn inject_prefix_in_placeholders(prefix: &str, text: &str) -> String {
    crate::template::placeholder_re().replace_all(text, |caps: &regex::Captures| {
        let inner = caps[1].trim();
        format!("${{{}}}", inject_prefix(prefix, inner))
    }).into_owned()
}
