use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BindError>;

/// Top level error taxonomy.
///
/// Provider modules define their own small leaf error types and fold them
/// into one of these variants at the module boundary (see `secrets::vault`,
/// `discovery::docker`, …) rather than exposing their internals here.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// YAML/JSON parse failure, validation failure, or a `{{ NAME }}`
    /// placeholder in raw config text that has no matching environment
    /// variable.
    #[error("failed to load config: {0}")]
    Load(String),

    /// A discoverer or gatherer failed. `Fetch` propagates this immediately
    /// without populating partial state.
    #[error("source '{source_name}' failed to fetch: {cause}")]
    Fetch {
        source_name: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A provider (subprocess, HTTP call, KMS round-trip) exceeded its
    /// deadline.
    #[error("provider '{provider}' timed out after {elapsed:?}")]
    Timeout {
        provider: String,
        elapsed: std::time::Duration,
    },

    /// Transport error, non-2xx status, non-zero exit, or an invalid
    /// response shape from a provider.
    #[error("provider '{provider}' error: {detail}")]
    Provider { provider: String, detail: String },

    /// `Replace` could not bind a placeholder: all sources and on-demand
    /// resolvers missed.
    #[error("unresolved placeholder '${{{0}}}'")]
    Unresolved(String),

    /// A matcher's regex field failed to compile.
    #[error("invalid pattern for field '{field}': {reason}")]
    InvalidPattern { field: String, reason: String },
}

impl BindError {
    pub fn fetch(source_name: impl Into<String>, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        BindError::Fetch { source_name: source_name.into(), cause: Box::new(cause) }
    }

    pub fn provider(provider: impl Into<String>, detail: impl fmt::Display) -> Self {
        BindError::Provider { provider: provider.into(), detail: detail.to_string() }
    }
}
