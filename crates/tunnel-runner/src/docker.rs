//! Docker CLI runtime.
//!
//! Production [`ContainerRuntime`] backed by the `docker` command-line
//! client; every primitive maps to one subcommand. Archive transfer uses
//! `docker cp` with `-` for the tar stream on stdin/stdout.

use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RunnerError;
use crate::runtime::{ContainerId, ContainerRuntime};

/// Poll interval for the deadline-bounded wait.
const WAIT_POLL_INTERVAL_MS: u64 = 100;

pub struct DockerCli {
    docker_bin: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Use the `docker` binary found on `PATH`.
    pub fn new() -> Self {
        Self {
            docker_bin: PathBuf::from("docker"),
        }
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: path.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(args);
        cmd
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, RunnerError> {
        let output = self
            .command(args)
            .output()
            .map_err(|e| RunnerError::Runtime(format!("failed to spawn docker {}: {}", args[0], e)))?;
        if !output.status.success() {
            return Err(RunnerError::Runtime(format!(
                "docker {} failed: {}",
                args[0],
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

/// Run a command with stdout and stderr feeding one shared pipe, preserving
/// the order the process wrote in across both streams.
fn combined_output(mut cmd: Command) -> io::Result<(ExitStatus, Vec<u8>)> {
    let (mut reader, writer) = io::pipe()?;
    cmd.stdout(writer.try_clone()?).stderr(writer);
    let mut child = cmd.spawn()?;
    // The Command still holds its copies of the write end; the reader only
    // sees EOF once they are closed.
    drop(cmd);
    let mut combined = Vec::new();
    reader.read_to_end(&mut combined)?;
    let status = child.wait()?;
    Ok((status, combined))
}

/// Write half of a `docker attach` session.
///
/// Dropping it closes the container's stdin and detaches; the attach child
/// is killed rather than awaited so a runaway container cannot block the
/// drop (the exit wait has its own deadline).
struct AttachedStdin {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Write for AttachedStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AttachedStdin {
    fn drop(&mut self) {
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl ContainerRuntime for DockerCli {
    fn create(&self, image: &str) -> Result<ContainerId, RunnerError> {
        // -i keeps stdin open; the shell in the container reads commands
        // from it for the lifetime of the session.
        let output = self
            .command(&["create", "-i", image])
            .output()
            .map_err(|e| RunnerError::EnvironmentCreation(e.to_string()))?;
        if !output.status.success() {
            return Err(RunnerError::EnvironmentCreation(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(RunnerError::EnvironmentCreation(
                "docker create returned no container id".into(),
            ));
        }
        Ok(ContainerId::new(id))
    }

    fn start(&self, id: &ContainerId) -> Result<(), RunnerError> {
        self.run_checked(&["start", id.as_str()])?;
        Ok(())
    }

    fn attach_stdin(&self, id: &ContainerId) -> Result<Box<dyn Write + Send>, RunnerError> {
        let mut child = self
            .command(&["attach", id.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(RunnerError::StreamWrite)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RunnerError::Runtime("docker attach has no stdin handle".into()))?;
        Ok(Box::new(AttachedStdin {
            child,
            stdin: Some(stdin),
        }))
    }

    fn wait(&self, id: &ContainerId, deadline: Option<Duration>) -> Result<i64, RunnerError> {
        let mut child = self
            .command(&["wait", id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RunnerError::Runtime(format!("failed to spawn docker wait: {}", e)))?;

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let mut out = String::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        let _ = stdout.read_to_string(&mut out);
                    }
                    if !status.success() {
                        return Err(RunnerError::Runtime("docker wait failed".into()));
                    }
                    return Ok(out.trim().parse::<i64>().unwrap_or(-1));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(RunnerError::Runtime(format!(
                        "failed to wait for docker wait: {}",
                        e
                    )))
                }
            }

            if let Some(deadline) = deadline {
                if start.elapsed() > deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerError::WaitTimeout(deadline.as_secs()));
                }
            }
            thread::sleep(Duration::from_millis(WAIT_POLL_INTERVAL_MS));
        }
    }

    fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, RunnerError> {
        // The daemon keeps one chronological log stream which `docker logs`
        // demuxes onto local stdout/stderr. Both must land in the same pipe
        // or the interleaving across channels is lost.
        let (status, combined) = combined_output(self.command(&["logs", id.as_str()]))
            .map_err(|e| RunnerError::Runtime(format!("docker logs: {}", e)))?;
        if !status.success() {
            return Err(RunnerError::Runtime(format!(
                "docker logs failed: {}",
                String::from_utf8_lossy(&combined).trim()
            )));
        }
        Ok(combined)
    }

    fn put_archive(&self, id: &ContainerId, path: &str, data: &[u8]) -> Result<(), RunnerError> {
        let dest = format!("{}:{}", id.as_str(), path);
        let mut child = self
            .command(&["cp", "-", &dest])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunnerError::Runtime(format!("failed to spawn docker cp: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(data)
                .map_err(|e| RunnerError::Runtime(format!("docker cp stdin: {}", e)))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| RunnerError::Runtime(format!("docker cp: {}", e)))?;
        if !output.status.success() {
            return Err(RunnerError::Runtime(format!(
                "docker cp into {} failed: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn get_archive(
        &self,
        id: &ContainerId,
        path: &str,
    ) -> Result<Box<dyn Read + Send>, RunnerError> {
        let src = format!("{}:{}", id.as_str(), path);
        let output = self
            .command(&["cp", &src, "-"])
            .output()
            .map_err(|e| RunnerError::ArchiveRetrieval {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(RunnerError::ArchiveRetrieval {
                path: path.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(Box::new(Cursor::new(output.stdout)))
    }

    fn remove(&self, id: &ContainerId) -> Result<(), RunnerError> {
        self.run_checked(&["rm", "-f", id.as_str()])?;
        Ok(())
    }
}
