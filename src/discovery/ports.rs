//! Shared ports policy, used by both the Docker container enumerator and
//! the Fargate task-metadata enumerator.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use crate::naming;

/// One port mapping on a discovered target.
#[derive(Debug, Clone)]
pub struct PortEntry {
    pub private_port: u16,
    /// 0 means "not published".
    pub public_port: u16,
    /// The address the public port is bound to, if any.
    pub bind_ip: Option<String>,
    /// Lowercased, e.g. `"tcp"`, `"udp"`.
    pub protocol: Option<String>,
}

fn is_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// Apply the shared ports policy, producing the canonical `ports.*` /
/// `private.ports.*` / `ip` / `port` / `private.port` keys.
///
/// The `isIPv4` filter is applied only to the public bind address;
/// private-port selection does not filter on address family at all. This
/// asymmetry is preserved deliberately, not simplified.
pub fn apply(ports: &[PortEntry]) -> BTreeMap<String, String> {
    let mut sorted: Vec<&PortEntry> = ports.iter().collect();
    sorted.sort_by_key(|p| p.private_port);

    let mut out = BTreeMap::new();

    if let Some(primary) = sorted.iter().find(|p| {
        p.public_port != 0 && p.bind_ip.as_deref().map(is_ipv4).unwrap_or(false)
    }) {
        out.insert(naming::ip(), primary.bind_ip.clone().unwrap());
        out.insert(naming::port(), primary.public_port.to_string());
    }

    if let Some(first) = sorted.first() {
        out.insert(naming::private_port(), first.private_port.to_string());
    }

    let mut proto_counts: HashMap<String, usize> = HashMap::new();
    for (i, p) in sorted.iter().enumerate() {
        out.insert(naming::ports_index(i), p.public_port.to_string());
        out.insert(naming::private_ports_index(i), p.private_port.to_string());

        if let Some(proto) = &p.protocol {
            let idx = *proto_counts.get(proto).unwrap_or(&0);
            if idx == 0 {
                out.insert(naming::ports_proto(proto), p.public_port.to_string());
                out.insert(naming::private_ports_proto(proto), p.private_port.to_string());
            }
            out.insert(naming::ports_proto_index(proto, idx), p.public_port.to_string());
            out.insert(naming::private_ports_proto_index(proto, idx), p.private_port.to_string());
            proto_counts.insert(proto.clone(), idx + 1);
        }
    }
    out
}
