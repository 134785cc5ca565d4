//! Observability: tracing init and the JSONL audit log.
//!
//! Uses [`crate::config::ObservabilityConfig`] for `TUNNEL_QUIET`,
//! `TUNNEL_LOG_LEVEL`, `TUNNEL_LOG_JSON`, and `TUNNEL_AUDIT_LOG`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing. Call once at process startup.
/// When `TUNNEL_QUIET=1`, only WARN and above are logged.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "tunnel=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn audit_path() -> Option<String> {
    let path = crate::config::ObservabilityConfig::from_env().audit_log?;
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Audit: run_started — right before container creation.
pub fn audit_run_started(command_count: usize, has_source: bool, artifact_patterns: usize) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "run_started",
            "command_count": command_count,
            "has_source": has_source,
            "artifact_patterns": artifact_patterns,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: run_completed — after container removal, success or failure.
pub fn audit_run_completed(
    container_id: &str,
    record_count: usize,
    has_output: bool,
    duration_ms: u64,
    success: bool,
) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "run_completed",
            "container_id": container_id,
            "record_count": record_count,
            "has_output": has_output,
            "duration_ms": duration_ms,
            "success": success,
        });
        append_jsonl(&path, &record);
    }
}
