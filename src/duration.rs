//! Go-style duration string parsing (`"15s"`, `"1h30m"`).
//!
//! Unitless numbers are rejected deliberately: the wire format is shared
//! between YAML config (`ttl: 1h`) and provider responses (`"ttl": "90s"`),
//! and a bare `90` is ambiguous between seconds and milliseconds.

use std::time::Duration;

/// Parse a Go-style duration string. Rejects unitless numeric strings.
pub fn parse(raw: &str) -> Result<Duration, String> {
    if raw.trim().chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(format!("duration '{}' has no unit (expected e.g. '15s', '1h30m')", raw));
    }
    duration_str::parse(raw).map_err(|e| format!("invalid duration '{}': {}", raw, e))
}

/// Default discovery TTL: 1 minute.
pub fn default_discovery_ttl() -> Duration {
    Duration::from_secs(60)
}

/// Default variable (secret) TTL: 1 hour.
pub fn default_variable_ttl() -> Duration {
    Duration::from_secs(3600)
}

/// Default command-enumerator process timeout: 1 minute.
pub fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}
