//! Sources aggregate: owns one optional discoverer and a named set of
//! gatherers, each independently TTL-cached, plus the construction-time
//! validation required to build one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::discovery::Discoverer;
use crate::error::{BindError, Result};
use crate::secrets::Gatherer;

/// `Sources.clock` is injectable for testability and must stay
/// `Send + Sync` so `Sources` itself remains `Send` for hosts that move it
/// across threads between synchronous `Fetch` calls.
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

pub struct Sources {
    pub(crate) clock: Clock,
    pub(crate) discoverer: Option<Discoverer>,
    pub(crate) variables: BTreeMap<String, Gatherer>,
}

impl Sources {
    /// Construct directly from already-validated pieces. The config loader
    /// is responsible for the duplicate-name / multiple-provider /
    /// multiple-discoverer checks before calling this — by the time a
    /// `Sources` exists those invariants already hold.
    pub fn new(discoverer: Option<Discoverer>, variables: BTreeMap<String, Gatherer>) -> Sources {
        Sources { clock: Arc::new(Instant::now), discoverer, variables }
    }

    /// Override the clock, e.g. a mock clock in tests.
    pub fn with_clock(mut self, clock: Clock) -> Sources {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> Instant {
        (self.clock)()
    }

    pub fn discoverer_mut(&mut self) -> Option<&mut Discoverer> {
        self.discoverer.as_mut()
    }

    pub fn variables_mut(&mut self) -> &mut BTreeMap<String, Gatherer> {
        &mut self.variables
    }

    /// Minimum of all variable cells' `stored_at + ttl`, used by the host to
    /// schedule proactive refresh. Deliberately excludes the discoverer's
    /// own cache — only variable cells are covered.
    pub fn get_soonest_expiration(&self) -> Option<Instant> {
        self.variables.values().filter_map(|g| g.expires_at()).min()
    }
}

/// Validates the shape required before a `Sources` is built: exactly zero
/// or one discovery kind (enforced structurally by the caller
/// passing `Option<Discoverer>`), zero-or-one provider per variable
/// (enforced by `GathererConfig` being an enum, one variant per variable),
/// and no duplicate variable names.
///
/// The only check left to make explicitly at this layer is duplicate names,
/// since a raw `(name, config)` list — not yet deduplicated by a map — is
/// what the config loader decodes off the wire before this point.
pub fn check_no_duplicate_names(names: &[String]) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(BindError::Load(format!("duplicate variable name '{name}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let names = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(check_no_duplicate_names(&names).is_err());
    }

    #[test]
    fn unique_names_pass() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(check_no_duplicate_names(&names).is_ok());
    }

    #[test]
    fn soonest_expiration_is_the_minimum_across_variable_cells_only() {
        use crate::secrets::{Gatherer, GathererConfig};
        use crate::secrets::obfuscated::ObfuscatedConfig;
        use std::time::Duration;

        let t0 = Instant::now();
        let mut vars = BTreeMap::new();
        let mut short = Gatherer::new(GathererConfig::Obfuscated(ObfuscatedConfig { key: "k".to_string(), secret: "aGVsbG8=".to_string() }), Duration::from_secs(10));
        let mut long = Gatherer::new(GathererConfig::Obfuscated(ObfuscatedConfig { key: "k".to_string(), secret: "aGVsbG8=".to_string() }), Duration::from_secs(100));
        short.do_fetch(t0).unwrap();
        long.do_fetch(t0).unwrap();
        vars.insert("short".to_string(), short);
        vars.insert("long".to_string(), long);

        let sources = Sources::new(None, vars);
        assert_eq!(sources.get_soonest_expiration(), Some(t0 + Duration::from_secs(10)));
    }
}
