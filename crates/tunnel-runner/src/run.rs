//! Request orchestration.
//!
//! `Created → Running → Exited → Collected → Destroyed`, strictly linear.
//! The container lease guarantees the Destroyed step on failure paths too,
//! so no request ever leaks a container.

use std::time::{Duration, Instant};

use tunnel_core::config::RunnerConfig;
use tunnel_core::observability;
use tunnel_core::protocol::{RunRequest, RunResponse};

use crate::archive::ArchiveFilter;
use crate::error::RunnerError;
use crate::parser;
use crate::runtime::{ContainerRuntime, LeasedContainer};
use crate::streamer::CommandStreamer;

/// Executes `run` requests against an injected container runtime.
///
/// Each request gets its own exclusively-owned container; a `Runner` is safe
/// to share across threads and requests never share state.
pub struct Runner<R: ContainerRuntime> {
    runtime: R,
    config: RunnerConfig,
}

impl<R: ContainerRuntime> Runner<R> {
    pub fn new(runtime: R, config: RunnerConfig) -> Self {
        Self { runtime, config }
    }

    /// Run one request to completion. Either a full response or a typed
    /// error; no partial results.
    pub fn run(&self, request: &RunRequest) -> Result<RunResponse, RunnerError> {
        let start = Instant::now();
        observability::audit_run_started(
            request.commands.len(),
            request.source.is_some(),
            request.dist.artifacts.len(),
        );
        tracing::info!(
            commands = request.commands.len(),
            has_source = request.source.is_some(),
            artifact_patterns = request.dist.artifacts.len(),
            "run started"
        );

        let lease = LeasedContainer::create(&self.runtime, &self.config.image)?;
        let wait_timeout = self.config.wait_timeout_secs.map(Duration::from_secs);

        let outcome = (|| {
            let streamer = CommandStreamer::new(&self.runtime, wait_timeout);
            let raw = streamer.run(lease.id(), &request.commands, request.source.as_deref())?;
            let results = parser::parse_output(&raw);
            let output = ArchiveFilter::new(&self.runtime).collect(lease.id(), &request.dist)?;
            Ok(RunResponse { results, output })
        })();

        let container_id = lease.id().to_string();
        drop(lease);

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(resp) => {
                observability::audit_run_completed(
                    &container_id,
                    resp.results.len(),
                    resp.output.is_some(),
                    duration_ms,
                    true,
                );
                tracing::info!(
                    container = %container_id,
                    records = resp.results.len(),
                    has_output = resp.output.is_some(),
                    duration_ms = duration_ms,
                    "run completed"
                );
            }
            Err(e) => {
                observability::audit_run_completed(&container_id, 0, false, duration_ms, false);
                tracing::warn!(container = %container_id, error = %e, "run failed");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use tunnel_core::protocol::DistConfig;

    fn request(cmds: &[&str]) -> RunRequest {
        RunRequest {
            commands: cmds.iter().map(|c| c.to_string()).collect(),
            source: None,
            dist: DistConfig::default(),
        }
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            image: "zenoscave/tunnel-runner:latest".into(),
            wait_timeout_secs: Some(300),
        }
    }

    #[test]
    fn test_full_lifecycle_without_artifacts() {
        let runtime = FakeRuntime::new().with_logs("[out] hello\n[out] world\n---\n[out] done\n");
        let runner = Runner::new(runtime, config());

        let resp = runner.run(&request(&["echo hello; echo world", "echo done"])).unwrap();

        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.results[0].get("out").unwrap(), &["hello", "world"]);
        assert_eq!(resp.results[1].get("out").unwrap(), &["done"]);
        assert!(resp.output.is_none());

        assert_eq!(
            runner.runtime.calls(),
            vec![
                "create zenoscave/tunnel-runner:latest",
                "start fake-0",
                "attach fake-0",
                "wait fake-0",
                "logs fake-0",
                "remove fake-0",
            ]
        );
    }

    #[test]
    fn test_artifacts_collected_after_exit() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "build/out.bin", &b"bytes"[..])
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let runtime = FakeRuntime::new()
            .with_logs("[out] built\n")
            .with_archive("/app/src/build", tar_bytes);
        let runner = Runner::new(runtime, config());

        let req = RunRequest {
            commands: vec!["make".into()],
            source: None,
            dist: DistConfig {
                base_path: "build".into(),
                artifacts: vec!["*.bin".into()],
            },
        };
        let resp = runner.run(&req).unwrap();
        assert!(resp.output.is_some());

        let calls = runner.runtime.calls();
        assert_eq!(calls.last().unwrap(), "remove fake-0");
        assert!(calls.contains(&"get_archive fake-0 /app/src/build".to_string()));
    }

    #[test]
    fn test_container_removed_on_failure() {
        let runtime = FakeRuntime::new().failing_logs();
        let runner = Runner::new(runtime, config());

        let err = runner.run(&request(&["true"])).unwrap_err();
        assert!(matches!(err, RunnerError::Runtime(_)));
        assert_eq!(runner.runtime.calls().last().unwrap(), "remove fake-0");
    }

    #[test]
    fn test_results_never_exceed_command_count() {
        // Three commands, but the middle block emits nothing tagged.
        let runtime = FakeRuntime::new().with_logs("[out] a\n---\nuntagged\n---\n[out] c\n");
        let runner = Runner::new(runtime, config());

        let req = request(&["echo a", "silent", "echo c"]);
        let resp = runner.run(&req).unwrap();
        assert!(resp.results.len() <= req.commands.len());
        assert_eq!(resp.results.len(), 2);
    }
}
