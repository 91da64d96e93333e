//! Replacer — generic recursive `${path}` substitution over heterogeneous
//! template shapes.
//!
//! Templates, Discovery annotations, and Gatherer payloads all share the
//! same tagged-union representation (`Value`). The textual round-trip
//! approach was chosen over a visitor/transformer trait: callers in this
//! crate only ever hand us YAML/JSON-shaped data, so there's no static type
//! to preserve.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use regex::Regex;

use crate::error::{BindError, Result};
use crate::values::{Discovery, EntityRewrite, Transformed, Values};

/// Tagged union for templates, annotations, and gatherer payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Convert a parsed JSON document into the crate's generic `Value` shape.
/// Numbers and booleans are stringified (the template walker only ever
/// substitutes into strings) and `null` becomes an empty scalar.
pub fn from_json(j: &serde_json::Value) -> Value {
    match j {
        serde_json::Value::Null => Value::Scalar(String::new()),
        serde_json::Value::Bool(b) => Value::Scalar(b.to_string()),
        serde_json::Value::Number(n) => Value::Scalar(n.to_string()),
        serde_json::Value::String(s) => Value::Scalar(s.clone()),
        serde_json::Value::Array(items) => Value::Seq(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect()),
    }
}

fn placeholder_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\$\{([\w._\s\[\]-]+)\}").expect("static placeholder regex"))
}

/// Expose the compiled placeholder regex to sibling modules (prefix
/// injection in `naming.rs` reuses the exact same grammar).
pub(crate) fn placeholder_re() -> &'static Regex {
    placeholder_regex()
}

/// Caller-supplied fallback lookup, consulted only after static sources
/// miss. Returns `None` on miss.
pub trait OnDemandResolver {
    fn resolve(&self, name: &str) -> Option<Vec<u8>>;
}

impl<F> OnDemandResolver for F
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    fn resolve(&self, name: &str) -> Option<Vec<u8>> {
        self(name)
    }
}

struct ResolveCtx<'a> {
    local: &'a BTreeMap<String, String>,
    common: &'a BTreeMap<String, String>,
    on_demand: &'a [&'a dyn OnDemandResolver],
}

impl<'a> ResolveCtx<'a> {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(v) = self.local.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.common.get(name) {
            return Some(v.clone());
        }
        for resolver in self.on_demand {
            if let Some(bytes) = resolver.resolve(name) {
                return Some(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        None
    }
}

/// Substitute every `${name}` occurrence in `text`. Leading/trailing
/// whitespace inside the braces is trimmed before lookup. A malformed
/// placeholder with unbalanced braces simply never matches the regex and is
/// left untouched — intentional, not a parser bug.
fn substitute_text(text: &str, ctx: &ResolveCtx) -> Result<(String, usize)> {
    let re = placeholder_regex();
    let mut count = 0usize;
    let mut first_err: Option<BindError> = None;
    let out = re.replace_all(text, |caps: &regex::Captures| {
        if first_err.is_some() {
            return String::new();
        }
        let name = caps[1].trim();
        count += 1;
        match ctx.resolve(name) {
            Some(v) => v,
            None => {
                first_err = Some(BindError::Unresolved(name.to_string()));
                String::new()
            }
        }
    });
    if let Some(err) = first_err {
        return Err(err);
    }
    Ok((out.into_owned(), count))
}

/// Count placeholder occurrences in `template` without resolving any of
/// them. Purely syntactic (a property of the template text alone), so it's
/// the same for every Discovery — used to decide whether a multi-discovery
/// `replace` needs to bind per-discovery at all before it touches any one
/// Discovery's local variables.
fn count_placeholders(template: &Value) -> usize {
    match template {
        Value::Scalar(s) => placeholder_regex().find_iter(s).count(),
        Value::Bytes(b) => placeholder_regex().find_iter(&String::from_utf8_lossy(b)).count(),
        Value::Seq(items) => items.iter().map(count_placeholders).sum(),
        Value::Map(map) => map.values().map(count_placeholders).sum(),
    }
}

/// Recursively walk `template`, rebuilding an isomorphic value with every
/// placeholder occurrence resolved. Returns the rebuilt value and the total
/// number of placeholder occurrences encountered.
fn walk(template: &Value, ctx: &ResolveCtx) -> Result<(Value, usize)> {
    match template {
        Value::Scalar(s) => {
            let (out, count) = substitute_text(s, ctx)?;
            Ok((Value::Scalar(out), count))
        }
        Value::Bytes(b) => {
            let as_text = String::from_utf8_lossy(b);
            let (out, count) = substitute_text(&as_text, ctx)?;
            Ok((Value::Bytes(out.into_bytes()), count))
        }
        Value::Seq(items) => {
            let mut total = 0;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let (v, c) = walk(item, ctx)?;
                total += c;
                out.push(v);
            }
            Ok((Value::Seq(out), total))
        }
        Value::Map(map) => {
            let mut total = 0;
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let (bound, c) = walk(v, ctx)?;
                total += c;
                out.insert(k.clone(), bound);
            }
            Ok((Value::Map(out), total))
        }
    }
}

/// Flatten an annotations map down to `string -> string` for metric
/// annotations, using the same dotted/bracket convention the Fetcher uses
/// when flattening gatherer payloads.
pub fn flatten_annotations(annotations: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (k, v) in annotations {
        flatten_into(k, v, &mut out);
    }
    out
}

fn flatten_into(prefix: &str, v: &Value, out: &mut BTreeMap<String, String>) {
    match v {
        Value::Scalar(s) => { out.insert(prefix.to_string(), s.clone()); }
        Value::Bytes(b) => { out.insert(prefix.to_string(), String::from_utf8_lossy(b).into_owned()); }
        Value::Seq(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(&format!("{}[{}]", prefix, i), item, out);
            }
        }
        Value::Map(map) => {
            for (k, item) in map {
                flatten_into(&format!("{}.{}", prefix, k), item, out);
            }
        }
    }
}

/// Best-effort placeholder substitution: an unresolved name is left as its
/// original `${name}` text rather than failing the call. Entity rewrites are
/// a post-processing convenience for telemetry, not part of the template
/// binding contract — a discovery whose default rewrite references a
/// variable it doesn't happen to carry (e.g. `${ip}` when no public IPv4
/// binding was found) shouldn't sink the whole `replace`.
fn substitute_text_best_effort(text: &str, ctx: &ResolveCtx) -> String {
    let re = placeholder_regex();
    re.replace_all(text, |caps: &regex::Captures| {
        let name = caps[1].trim();
        ctx.resolve(name).unwrap_or_else(|| caps[0].to_string())
    }).into_owned()
}

/// Resolve the placeholders in a Discovery's entity rewrites. `match` and
/// `replace_field` get the `discovery.` prefix injected into bare
/// placeholders before substitution. Never fails: an unresolved placeholder
/// is left untouched in the rewrite field rather than aborting `replace`.
fn resolve_rewrites(d: &Discovery, common: &BTreeMap<String, String>, on_demand: &[&dyn OnDemandResolver]) -> Vec<EntityRewrite> {
    let ctx = ResolveCtx { local: &d.variables, common, on_demand };
    let mut out = Vec::with_capacity(d.entity_rewrites.len());
    for rw in &d.entity_rewrites {
        let m = crate::naming::inject_prefix_in_placeholders(crate::naming::DISCOVERY_PREFIX, &rw.r#match);
        let rf = crate::naming::inject_prefix_in_placeholders(crate::naming::DISCOVERY_PREFIX, &rw.replace_field);
        let m = substitute_text_best_effort(&m, &ctx);
        let rf = substitute_text_best_effort(&rf, &ctx);
        out.push(EntityRewrite { action: rw.action.clone(), r#match: m, replace_field: rf });
    }
    out
}

fn bind_one(template: &Value, d: &Discovery, common: &BTreeMap<String, String>, on_demand: &[&dyn OnDemandResolver]) -> Result<Transformed> {
    let ctx = ResolveCtx { local: &d.variables, common, on_demand };
    let (bound, count) = walk(template, &ctx)?;
    let rewrites = resolve_rewrites(d, common, on_demand);
    if count == 0 {
        // "template has no variables" short-circuits to a single match,
        // independent of |D| — return the template unchanged.
        Ok(Transformed { variables: template.clone(), metric_annotations: BTreeMap::new(), entity_rewrites: rewrites })
    } else {
        Ok(Transformed { variables: bound, metric_annotations: flatten_annotations(&d.annotations), entity_rewrites: rewrites })
    }
}

/// Top-level replace operation. `on_demand` resolvers are tried in order
/// after static sources miss.
pub fn replace(values: &Values, template: &Value, on_demand: &[&dyn OnDemandResolver]) -> Result<Vec<Transformed>> {
    let empty_common: BTreeMap<String, String> = BTreeMap::new();

    if values.discov.is_empty() && values.vars.is_empty() {
        let probe = Discovery::default();
        return match bind_one(template, &probe, &empty_common, on_demand) {
            Ok(t) => Ok(vec![t]),
            Err(BindError::Unresolved(_)) => Ok(vec![]),
            Err(e) => Err(e),
        };
    }

    if values.discov.is_empty() {
        // V non-empty: substitute once using V as the sole synthetic Discovery.
        let synthetic = Discovery { variables: values.vars.clone(), ..Discovery::default() };
        let t = bind_one(template, &synthetic, &empty_common, on_demand)?;
        return Ok(vec![t]);
    }

    // A template with no placeholders binds to the same output no matter how
    // many discoveries there are — collapse to a single Transformed instead
    // of repeating it once per discovery.
    if count_placeholders(template) == 0 {
        let first = values.discov.first().expect("this branch only runs when discov is non-empty");
        return Ok(vec![bind_one(template, first, &values.vars, on_demand)?]);
    }

    let mut out = Vec::with_capacity(values.discov.len());
    for d in &values.discov {
        out.push(bind_one(template, d, &values.vars, on_demand)?);
    }
    Ok(out)
}

/// Byte-sequence specialization of `replace`.
pub fn replace_bytes(values: &Values, template: &[u8], on_demand: &[&dyn OnDemandResolver]) -> Result<Vec<Vec<u8>>> {
    let wrapped = Value::Bytes(template.to_vec());
    let transformed = replace(values, &wrapped, on_demand)?;
    Ok(transformed.into_iter().map(|t| match t.variables {
        Value::Bytes(b) => b,
        Value::Scalar(s) => s.into_bytes(),
        other => format!("{:?}", other).into_bytes(),
    }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: &str) -> Value { Value::Scalar(s.to_string()) }

    fn map(pairs: &[(&str, Value)]) -> Value {
        Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    fn discovery(vars: &[(&str, &str)]) -> Discovery {
        Discovery {
            variables: vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Discovery::default()
        }
    }

    #[test]
    fn template_with_no_placeholders_returns_one_transformed_regardless_of_discov_len() {
        let t = map(&[("a", scalar("static"))]);
        let values = Values {
            vars: BTreeMap::new(),
            discov: vec![discovery(&[]), discovery(&[]), discovery(&[])],
        };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].variables, t);
    }

    #[test]
    fn one_transformed_per_discovery_when_resolvable() {
        let t = scalar("http://${ip}:${port}/");
        let values = Values {
            vars: BTreeMap::new(),
            discov: vec![
                discovery(&[("ip", "1.2.3.4"), ("port", "8888")]),
                discovery(&[("ip", "5.6.7.8"), ("port", "1111")]),
            ],
        };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].variables, scalar("http://1.2.3.4:8888/"));
        assert_eq!(out[1].variables, scalar("http://5.6.7.8:1111/"));
    }

    #[test]
    fn empty_discov_and_vars_with_unresolvable_placeholder_yields_zero_results() {
        let t = scalar("${missing}");
        let values = Values::default();
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out, vec![]);
    }

    #[test]
    fn empty_discov_and_vars_with_no_placeholders_binds_once() {
        let t = scalar("static");
        let values = Values::default();
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].variables, t);
    }

    #[test]
    fn structural_replacement_preserves_shape() {
        let t = map(&[
            ("url", scalar("http://${discovery.ip}:${discovery.port}/")),
            ("labels", map(&[("host", scalar("${hostname}"))])),
        ]);
        let values = Values {
            vars: BTreeMap::new(),
            discov: vec![
                discovery(&[("discovery.ip", "1.2.3.4"), ("discovery.port", "8888"), ("hostname", "jarl")]),
                discovery(&[("discovery.ip", "5.6.7.8"), ("discovery.port", "1111"), ("hostname", "nopuedor")]),
            ],
        };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out.len(), 2);
        let Value::Map(m0) = &out[0].variables else { panic!() };
        assert_eq!(m0["url"], scalar("http://1.2.3.4:8888/"));
        let Value::Map(labels0) = &m0["labels"] else { panic!() };
        assert_eq!(labels0["host"], scalar("jarl"));
    }

    #[test]
    fn resolution_order_prefers_local_then_common_then_on_demand() {
        let t = scalar("${name}");
        let mut common = BTreeMap::new();
        common.insert("name".to_string(), "from-common".to_string());
        let values = Values {
            vars: common,
            discov: vec![discovery(&[("name", "from-local")])],
        };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out[0].variables, scalar("from-local"));
    }

    #[test]
    fn on_demand_resolver_is_last_resort() {
        let t = scalar("${elsewhere}");
        let resolver: &dyn OnDemandResolver = &(|name: &str| -> Option<Vec<u8>> {
            if name == "elsewhere" { Some(b"found".to_vec()) } else { None }
        });
        let values = Values {
            vars: BTreeMap::new(),
            discov: vec![discovery(&[])],
        };
        let out = replace(&values, &t, &[resolver]).unwrap();
        assert_eq!(out[0].variables, scalar("found"));
    }

    #[test]
    fn malformed_placeholder_with_unbalanced_braces_is_left_untouched() {
        let t = scalar("${test:incomplete");
        let values = Values::default();
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out[0].variables, t);
    }

    #[test]
    fn nested_path_and_index_placeholders_resolve() {
        let t = map(&[
            ("a", scalar("${oml.toppings[2]}")),
            ("b", scalar("${oml.steps.third}")),
        ]);
        let values = Values {
            vars: vec![
                ("oml.toppings[0]".to_string(), "garlic".to_string()),
                ("oml.toppings[1]".to_string(), "onion".to_string()),
                ("oml.toppings[2]".to_string(), "cheese".to_string()),
                ("oml.steps.third".to_string(), "burn it!".to_string()),
            ].into_iter().collect(),
            discov: vec![discovery(&[])],
        };
        let out = replace(&values, &t, &[]).unwrap();
        let Value::Map(m) = &out[0].variables else { panic!() };
        assert_eq!(m["a"], scalar("cheese"));
        assert_eq!(m["b"], scalar("burn it!"));
    }

    #[test]
    fn rewrite_match_gets_discovery_prefix_injected() {
        let t = scalar("static");
        let d = Discovery {
            variables: vec![
                ("discovery.ip".to_string(), "9.9.9.9".to_string()),
                ("discovery.containerId".to_string(), "abc123".to_string()),
            ].into_iter().collect(),
            entity_rewrites: vec![EntityRewrite {
                action: "replace".to_string(),
                r#match: "${ip}".to_string(),
                replace_field: "container:${containerId}".to_string(),
            }],
            ..Discovery::default()
        };
        let values = Values { vars: BTreeMap::new(), discov: vec![d] };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out[0].entity_rewrites[0].r#match, "9.9.9.9");
        assert_eq!(out[0].entity_rewrites[0].replace_field, "container:abc123");
    }

    #[test]
    fn unresolved_rewrite_placeholder_does_not_fail_the_binding() {
        // A container matched by name/label with no public IPv4 binding
        // carries no `discovery.ip` (see discovery/ports.rs), but every
        // docker/fargate discovery still carries the default rewrite
        // referencing `${ip}`. That must not sink the whole `replace`.
        let t = scalar("static");
        let d = Discovery {
            variables: vec![("discovery.containerId".to_string(), "abc123".to_string())].into_iter().collect(),
            entity_rewrites: vec![crate::discovery::default_entity_rewrite()],
            ..Discovery::default()
        };
        let values = Values { vars: BTreeMap::new(), discov: vec![d] };
        let out = replace(&values, &t, &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_rewrites[0].r#match, "${discovery.ip}");
        assert_eq!(out[0].entity_rewrites[0].replace_field, "container:abc123");
    }
}
