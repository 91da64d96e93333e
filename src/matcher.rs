//! Matcher — a declarative `{field -> literal-or-regex}` predicate over a
//! candidate attribute map.

use std::collections::BTreeMap;
use regex::Regex;

use crate::error::{BindError, Result};

enum Predicate {
    Literal(String),
    Regex(Regex),
}

impl Predicate {
    fn matches(&self, value: &str) -> bool {
        match self {
            Predicate::Literal(lit) => lit == value,
            Predicate::Regex(re) => re.is_match(value),
        }
    }
}

/// Compiled selector. A string field whose full form is `/.../` (leading and
/// trailing slash) is a regex; its delimiters are stripped before compiling.
/// Everything else is a literal-equality predicate.
pub struct Matcher {
    fields: BTreeMap<String, Predicate>,
}

impl Matcher {
    /// Compile a matcher from `field -> literal-or-/regex/` pairs.
    pub fn new(raw: &BTreeMap<String, String>) -> Result<Matcher> {
        let mut fields = BTreeMap::new();
        for (field, pattern) in raw {
            let predicate = if is_regex_form(pattern) {
                let inner = &pattern[1..pattern.len() - 1];
                let re = Regex::new(inner).map_err(|e| BindError::InvalidPattern {
                    field: field.clone(),
                    reason: e.to_string(),
                })?;
                Predicate::Regex(re)
            } else {
                Predicate::Literal(pattern.clone())
            };
            fields.insert(field.clone(), predicate);
        }
        Ok(Matcher { fields })
    }

    /// True iff every predicate matches `fields[field_name]` and the key is
    /// present. An empty matcher is vacuously true. Field order is
    /// irrelevant.
    pub fn all(&self, fields: &BTreeMap<String, String>) -> bool {
        self.fields.iter().all(|(field, predicate)| {
            fields.get(field).map(|v| predicate.matches(v)).unwrap_or(false)
        })
    }
}

fn is_regex_form(pattern: &str) -> bool {
    pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/')
}
