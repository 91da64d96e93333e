//! Secret gatherers.

pub mod http_tls;
pub mod vault;
pub mod kms;
pub mod obfuscated;
pub mod command;
pub mod cli_cred;
pub mod http_cred;

use std::time::{Duration, Instant};

use crate::cache::Cell;
use crate::error::Result;
use crate::template::Value;

pub enum GathererConfig {
    Vault(vault::VaultConfig),
    Kms(kms::KmsConfig),
    Obfuscated(obfuscated::ObfuscatedConfig),
    Command(command::CommandSecretConfig),
    CliCred(cli_cred::CliCredConfig),
    HttpCred(http_cred::HttpCredConfig),
}

impl GathererConfig {
    /// Returns the fetched value and, for providers that can advertise
    /// their own TTL (the command provider), an optional override.
    fn fetch(&self) -> Result<(Value, Option<Duration>)> {
        match self {
            GathererConfig::Vault(c) => vault::fetch(c).map(|v| (v, None)),
            GathererConfig::Kms(c) => kms::fetch(c).map(|v| (v, None)),
            GathererConfig::Obfuscated(c) => obfuscated::fetch(c).map(|v| (v, None)),
            GathererConfig::Command(c) => command::fetch(c),
            GathererConfig::CliCred(c) => cli_cred::fetch(c).map(|v| (v, None)),
            GathererConfig::HttpCred(c) => http_cred::fetch(c).map(|v| (v, None)),
        }
    }
}

/// One named secret source: a fetch closure (config + dispatch) plus its
/// own cache cell.
pub struct Gatherer {
    config: GathererConfig,
    cache: Cell<Value>,
}

impl Gatherer {
    pub fn new(config: GathererConfig, ttl: Duration) -> Gatherer {
        Gatherer { config, cache: Cell::new(ttl) }
    }

    pub fn do_fetch(&mut self, now: Instant) -> Result<Value> {
        if let Some(v) = self.cache.get(now) {
            return Ok(v);
        }
        let (value, ttl_override) = self.config.fetch()?;
        if let Some(ttl) = ttl_override {
            self.cache.set_ttl(ttl);
        }
        self.cache.set(value.clone(), now);
        Ok(value)
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.cache.expires_at()
    }
}
