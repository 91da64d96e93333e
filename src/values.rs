//! Discovery / Values / EntityRewrite data types.

use std::collections::BTreeMap;
use crate::template::Value;

/// A single post-processing rule consumed by external telemetry to
/// re-identify records that embed discovered attributes (e.g. an IP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRewrite {
    pub action: String,
    pub r#match: String,
    pub replace_field: String,
}

/// One matched target produced by an enumerator on a single refresh.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Lowercase dotted keys, see the canonical namespace in `naming.rs`.
    pub variables: BTreeMap<String, String>,
    /// Arbitrary nested annotation data, emitted as metric annotations.
    pub annotations: BTreeMap<String, Value>,
    /// Ordered; applied positionally.
    pub entity_rewrites: Vec<EntityRewrite>,
}

/// Immutable snapshot produced by one `Fetch` pass.
#[derive(Debug, Clone, Default)]
pub struct Values {
    pub vars: BTreeMap<String, String>,
    pub discov: Vec<Discovery>,
}

impl Values {
    pub fn vars_len(&self) -> usize {
        self.vars.len()
    }
}

/// One bound template produced by `Replace`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub variables: Value,
    pub metric_annotations: BTreeMap<String, String>,
    pub entity_rewrites: Vec<EntityRewrite>,
}
