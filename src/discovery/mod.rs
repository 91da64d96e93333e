//! Discovery sources.
//!
//! Discovery-sourced variable names are always stored under the
//! `discovery.` namespace. The command enumerator needs an explicit
//! promotion step because its variables arrive unprefixed from the child
//! process's JSON; the container/task-metadata enumerators build the keys
//! with the prefix already in place. Either way the end state — and what
//! `Matcher` sees — is the same prefixed attribute map.

pub mod ports;
pub mod docker;
pub mod fargate;
pub mod command;

use std::time::{Duration, Instant};

use crate::cache::Cell;
use crate::error::Result;
use crate::naming;
use crate::values::{Discovery, EntityRewrite};

/// The one entity-rewrite every container/task-metadata discovery carries,
/// so downstream telemetry can re-identify records embedding the discovered
/// IP.
pub fn default_entity_rewrite() -> EntityRewrite {
    EntityRewrite {
        action: "replace".to_string(),
        r#match: naming::as_placeholder(&naming::ip()),
        replace_field: format!("container:{}", naming::as_placeholder(&naming::container_id())),
    }
}

/// Promote a raw (bare-key) attribute map into the `discovery.` namespace.
pub fn promote(attrs: std::collections::BTreeMap<String, String>) -> std::collections::BTreeMap<String, String> {
    attrs.into_iter().map(|(k, v)| (naming::inject_prefix(naming::DISCOVERY_PREFIX, &k), v)).collect()
}

/// Configuration for whichever single discovery kind is active. At most one
/// may be configured per `Sources`.
pub enum DiscovererConfig {
    Docker(docker::DockerConfig),
    Fargate(fargate::FargateConfig),
    Command(command::CommandConfig),
}

impl DiscovererConfig {
    fn fetch(&self) -> Result<Vec<Discovery>> {
        match self {
            DiscovererConfig::Docker(c) => docker::fetch(c),
            DiscovererConfig::Fargate(c) => fargate::fetch(c),
            DiscovererConfig::Command(c) => command::fetch(c),
        }
    }
}

/// One discovery source: a fetch closure (here, a config + dispatch) plus
/// its own cache cell.
pub struct Discoverer {
    config: DiscovererConfig,
    cache: Cell<Vec<Discovery>>,
}

impl Discoverer {
    pub fn new(config: DiscovererConfig, ttl: Duration) -> Discoverer {
        Discoverer { config, cache: Cell::new(ttl) }
    }

    pub fn do_fetch(&mut self, now: Instant) -> Result<Vec<Discovery>> {
        let config = &self.config;
        self.cache.get_or_refill(now, || config.fetch())
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.cache.expires_at()
    }
}
