//! Interactive command streaming.
//!
//! Commands run through a single attached stdin stream rather than discrete
//! execs: the shell that reads them keeps its state (cwd, env vars,
//! background jobs) alive between commands, which one-shot invocation would
//! lose.

use std::io::Write;
use std::time::Duration;

use base64::Engine;
use tunnel_core::config::WORK_ROOT;

use crate::error::RunnerError;
use crate::runtime::{ContainerId, ContainerRuntime};

/// Separator substituted for embedded newlines, so one logical command can
/// carry sequential sub-statements on a single stream line.
const STATEMENT_SEPARATOR: &str = " ; ";

/// Sentinel command ending the interactive session.
const SENTINEL: &str = "exit";

/// Drives one container through unpack → start → stream → wait → logs.
pub struct CommandStreamer<'a> {
    runtime: &'a dyn ContainerRuntime,
    wait_timeout: Option<Duration>,
}

impl<'a> CommandStreamer<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, wait_timeout: Option<Duration>) -> Self {
        Self {
            runtime,
            wait_timeout,
        }
    }

    /// Execute `commands` in request order and return the combined
    /// stdout/stderr text once the container has exited.
    ///
    /// The source archive, when present, is unpacked into [`WORK_ROOT`]
    /// before the container starts.
    pub fn run(
        &self,
        id: &ContainerId,
        commands: &[String],
        source: Option<&str>,
    ) -> Result<String, RunnerError> {
        if let Some(encoded) = source {
            let data = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| RunnerError::Encoding(format!("invalid source base64: {}", e)))?;
            self.runtime.put_archive(id, WORK_ROOT, &data)?;
        }

        self.runtime.start(id)?;

        let mut stdin = self.runtime.attach_stdin(id)?;
        for cmd in commands.iter().map(String::as_str).chain([SENTINEL]) {
            let mut line = cmd.replace('\n', STATEMENT_SEPARATOR);
            line.push('\n');
            // A failed write aborts the whole run; remaining commands must
            // never be dropped silently.
            stdin
                .write_all(line.as_bytes())
                .map_err(RunnerError::StreamWrite)?;
        }
        stdin.flush().map_err(RunnerError::StreamWrite)?;
        drop(stdin);

        let exit_code = self.runtime.wait(id, self.wait_timeout)?;
        tracing::debug!(container = %id, exit_code = exit_code, "container exited");

        let logs = self.runtime.logs(id)?;
        Ok(String::from_utf8_lossy(&logs).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn commands(cmds: &[&str]) -> Vec<String> {
        cmds.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_embedded_newlines_become_separators() {
        let runtime = FakeRuntime::new().with_logs("");
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);

        streamer
            .run(&id, &commands(&["echo a\necho b"]), None)
            .unwrap();

        assert_eq!(runtime.stdin_text(), "echo a ; echo b\nexit\n");
    }

    #[test]
    fn test_commands_stream_in_request_order_then_sentinel() {
        let runtime = FakeRuntime::new().with_logs("");
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);

        streamer
            .run(&id, &commands(&["cd /tmp", "pwd"]), None)
            .unwrap();

        assert_eq!(runtime.stdin_text(), "cd /tmp\npwd\nexit\n");
    }

    #[test]
    fn test_source_unpacked_before_start() {
        let runtime = FakeRuntime::new().with_logs("");
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);
        let source = base64::engine::general_purpose::STANDARD.encode(b"tarball");

        streamer.run(&id, &commands(&["ls"]), Some(&source)).unwrap();

        assert_eq!(
            runtime.calls(),
            vec![
                "create img",
                "put_archive fake-0 /app/src",
                "start fake-0",
                "attach fake-0",
                "wait fake-0",
                "logs fake-0",
            ]
        );
        assert_eq!(runtime.put_archives(), vec![("/app/src".to_string(), b"tarball".to_vec())]);
    }

    #[test]
    fn test_invalid_source_base64_is_encoding_error() {
        let runtime = FakeRuntime::new();
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);

        let err = streamer
            .run(&id, &commands(&["ls"]), Some("not//valid=="))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Encoding(_)));
        // Nothing was unpacked or started.
        assert_eq!(runtime.calls(), vec!["create img"]);
    }

    #[test]
    fn test_write_failure_surfaces_stream_write() {
        // Accept the first command line, then break the pipe.
        let runtime = FakeRuntime::new().failing_stdin_after(5);
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);

        let err = streamer
            .run(&id, &commands(&["true", "echo never-written"]), None)
            .unwrap_err();
        assert!(matches!(err, RunnerError::StreamWrite(_)));
        assert!(!runtime.stdin_text().contains("never-written"));
    }

    #[test]
    fn test_logs_decode_lossily() {
        let runtime = FakeRuntime::new().with_logs("[out] ok\n");
        let id = runtime.create("img").unwrap();
        let streamer = CommandStreamer::new(&runtime, None);

        let text = streamer.run(&id, &commands(&["true"]), None).unwrap();
        assert_eq!(text, "[out] ok\n");
    }
}
