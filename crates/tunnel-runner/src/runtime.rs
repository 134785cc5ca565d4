//! Container runtime seam.
//!
//! The engine never talks to a runtime directly; it drives this trait. The
//! production implementation is [`crate::docker::DockerCli`]; tests inject a
//! fake that records the call sequence.

use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;

use crate::error::RunnerError;

/// Opaque container identifier returned by [`ContainerRuntime::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primitives the engine requires from a container runtime.
pub trait ContainerRuntime: Send + Sync {
    /// Create a container from `image` with stdin kept open and interactive.
    fn create(&self, image: &str) -> Result<ContainerId, RunnerError>;

    /// Start the created container.
    fn start(&self, id: &ContainerId) -> Result<(), RunnerError>;

    /// Attach to the container's stdin. Dropping the returned writer closes
    /// the write side of the stream.
    fn attach_stdin(&self, id: &ContainerId) -> Result<Box<dyn Write + Send>, RunnerError>;

    /// Block until the container exits and return its exit code. Exceeding
    /// `deadline` yields [`RunnerError::WaitTimeout`].
    fn wait(&self, id: &ContainerId, deadline: Option<Duration>) -> Result<i64, RunnerError>;

    /// Combined stdout/stderr log bytes of the exited container.
    fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, RunnerError>;

    /// Unpack tar `data` at `path` inside the container.
    fn put_archive(&self, id: &ContainerId, path: &str, data: &[u8]) -> Result<(), RunnerError>;

    /// Stream the tar archive of the subtree rooted at `path`. Chunk sizes
    /// are transport-defined; callers must drain to completion before
    /// parsing.
    fn get_archive(&self, id: &ContainerId, path: &str)
        -> Result<Box<dyn Read + Send>, RunnerError>;

    /// Remove the container, killing it if still running.
    fn remove(&self, id: &ContainerId) -> Result<(), RunnerError>;
}

/// Scoped container lease.
///
/// Holding a lease means exclusive ownership of one container for one
/// request. Dropping it removes the container, which makes cleanup hold on
/// every exit path, including early-error returns.
pub struct LeasedContainer<'a> {
    runtime: &'a dyn ContainerRuntime,
    id: ContainerId,
}

impl<'a> LeasedContainer<'a> {
    pub fn create(runtime: &'a dyn ContainerRuntime, image: &str) -> Result<Self, RunnerError> {
        let id = runtime.create(image)?;
        tracing::debug!(container = %id, image = %image, "container created");
        Ok(Self { runtime, id })
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }
}

impl Drop for LeasedContainer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.remove(&self.id) {
            tracing::warn!(container = %self.id, error = %e, "Failed to remove container");
        } else {
            tracing::debug!(container = %self.id, "container removed");
        }
    }
}
