//! Environment-driven configuration.
//!
//! Centralises the `TUNNEL_*` variables so fallback logic is not repeated in
//! business code.

use std::env;

/// Fixed path inside the container where source archives are unpacked and
/// from which artifact retrieval is rooted. A protocol convention shared
/// with the runner image, not a tunable.
pub const WORK_ROOT: &str = "/app/src";

/// Default runner image when `TUNNEL_IMAGE` is unset.
pub const DEFAULT_IMAGE: &str = "zenoscave/tunnel-runner:latest";

/// Default container-exit deadline in seconds.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

/// Read an env var, treating empty values as unset.
fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read a boolean env var: `1`/`true`/`yes` (case-insensitive) are true.
fn env_bool(key: &str) -> bool {
    env_optional(key).is_some_and(|v| {
        let v = v.trim().to_lowercase();
        v == "1" || v == "true" || v == "yes"
    })
}

/// Runner configuration for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Container image the commands run in. Fixed by configuration, never
    /// taken from request input.
    pub image: String,
    /// Deadline for the container-exit wait. `None` blocks forever
    /// (`TUNNEL_WAIT_TIMEOUT_SECS=0`).
    pub wait_timeout_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RunnerConfig {
    /// Load from environment variables, applying defaults for unset values.
    pub fn from_env() -> Self {
        let image = env_optional("TUNNEL_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        let wait_timeout_secs = match env_optional("TUNNEL_WAIT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(secs),
            None => Some(DEFAULT_WAIT_TIMEOUT_SECS),
        };
        Self {
            image,
            wait_timeout_secs,
        }
    }
}

/// Observability configuration (tracing level, JSON output, audit log path).
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    /// JSONL audit log path; `None` disables audit events.
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            quiet: env_bool("TUNNEL_QUIET"),
            log_level: env_optional("TUNNEL_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: env_bool("TUNNEL_LOG_JSON"),
            audit_log: env_optional("TUNNEL_AUDIT_LOG"),
        }
    }
}
