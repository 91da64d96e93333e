//! Fetcher: drives a `Sources` to produce one `Values` snapshot, and the
//! variable-flattening rule shared by every gatherer payload shape.

use std::collections::BTreeMap;

use crate::error::{BindError, Result};
use crate::sources::Sources;
use crate::template::Value;
use crate::values::Values;

/// Flatten a gatherer's returned `Value` down into `vars[key] = ...` entries:
/// strings assign directly; maps recurse with `.subkey`; sequences recurse
/// with `[i]`. A map keyed by stringified integers is reachable via
/// the same `.i` dotted form any other map key gets — no special case needed,
/// since the `Map` branch below doesn't care what the key text looks like.
pub fn flatten_variable(key: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Scalar(s) => {
            out.insert(key.to_string(), s.clone());
        }
        Value::Bytes(b) => {
            out.insert(key.to_string(), String::from_utf8_lossy(b).into_owned());
        }
        Value::Seq(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_variable(&format!("{key}[{i}]"), item, out);
            }
        }
        Value::Map(map) => {
            for (k, item) in map {
                flatten_variable(&format!("{key}.{k}"), item, out);
            }
        }
    }
}

/// Top-level algorithm: `Fetch(sources) -> Values`.
///
/// 1. Sample `now` from `sources.clock`.
/// 2. If a discoverer is configured, invoke it; propagate errors without
///    populating partial state.
/// 3. For each named gatherer, invoke it and flatten its value into `vars`.
pub fn fetch(sources: &mut Sources) -> Result<Values> {
    let now = sources.now();

    let discov = match sources.discoverer_mut() {
        Some(d) => d.do_fetch(now).map_err(|e| wrap_fetch_error("discovery", e))?,
        None => Vec::new(),
    };

    let mut vars = BTreeMap::new();
    for (name, gatherer) in sources.variables_mut() {
        let value = gatherer.do_fetch(now).map_err(|e| wrap_fetch_error(name, e))?;
        flatten_variable(name, &value, &mut vars);
    }

    Ok(Values { vars, discov })
}

fn wrap_fetch_error(source_name: &str, cause: BindError) -> BindError {
    match cause {
        already @ BindError::Fetch { .. } => already,
        other => BindError::fetch(source_name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn scalar(s: &str) -> Value { Value::Scalar(s.to_string()) }
    fn map(pairs: &[(&str, Value)]) -> Value { Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()) }

    #[test]
    fn flattens_nested_map_and_sequence() {
        let oml = map(&[
            ("eggs", scalar("3")),
            ("toppings", Value::Seq(vec![scalar("garlic"), scalar("onion"), scalar("cheese")])),
            ("steps", map(&[("first", scalar("chop"))])),
        ]);
        let mut out = Map::new();
        flatten_variable("oml", &oml, &mut out);
        assert_eq!(out["oml.eggs"], "3");
        assert_eq!(out["oml.toppings[0]"], "garlic");
        assert_eq!(out["oml.toppings[1]"], "onion");
        assert_eq!(out["oml.toppings[2]"], "cheese");
        assert_eq!(out["oml.steps.first"], "chop");
    }

    #[test]
    fn flattens_plain_scalar_directly_under_its_key() {
        let mut out = Map::new();
        flatten_variable("password", &scalar("hunter2"), &mut out);
        assert_eq!(out["password"], "hunter2");
    }

    #[test]
    fn fetch_populates_discov_and_flattened_vars_from_a_live_sources() {
        use crate::secrets::{Gatherer, GathererConfig};
        use crate::secrets::obfuscated::ObfuscatedConfig;
        use std::time::Duration;

        let mut vars = Map::new();
        vars.insert("token".to_string(), Gatherer::new(
            GathererConfig::Obfuscated(ObfuscatedConfig { key: "k".to_string(), secret: base64_xor("k", b"hunter2") }),
            Duration::from_secs(60),
        ));
        let mut sources = Sources::new(None, vars);
        let values = fetch(&mut sources).unwrap();
        assert_eq!(values.vars["token"], "hunter2");
        assert!(values.discov.is_empty());
        assert_eq!(values.vars_len(), 1);
    }

    fn base64_xor(key: &str, plain: &[u8]) -> String {
        use base64::Engine;
        let xored: Vec<u8> = plain.iter().enumerate().map(|(i, b)| b ^ key.as_bytes()[i % key.len()]).collect();
        base64::engine::general_purpose::STANDARD.encode(xored)
    }
}
