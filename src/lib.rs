//! `bindcat` — a configuration data-binding engine.
//!
//! Discovers runtime targets (containers, task-metadata endpoints, arbitrary
//! command-emitted records), gathers secret values from external providers,
//! and replaces `${var}` placeholders in a caller-supplied template against
//! the cartesian product of discovered targets and gathered secrets — under
//! independent TTL caches per source so external services aren't hammered on
//! every call.
//!
//! Top-level data flow: `YAML bytes -> Sources -> Fetch(now) -> Values ->
//! Replace(template) -> Vec<Transformed>`. Start at [`config::load`] to build
//! a [`sources::Sources`] from a declarative manifest, [`fetch::fetch`] it on
//! whatever schedule the host owns, and pass the resulting
//! [`values::Values`] into [`template::replace`] against a parsed template.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod duration;
pub mod error;
pub mod fetch;
pub mod matcher;
pub mod naming;
pub mod procutil;
pub mod secrets;
pub mod sources;
pub mod template;
pub mod values;

pub use error::{BindError, Result};
pub use fetch::fetch as fetch_values;
pub use sources::Sources;
pub use template::{replace, replace_bytes, OnDemandResolver, Value};
pub use values::{Discovery, EntityRewrite, Transformed, Values};
