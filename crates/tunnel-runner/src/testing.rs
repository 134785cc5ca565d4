//! In-memory [`ContainerRuntime`] double for engine tests.
//!
//! Records every call in order, captures streamed stdin bytes, and serves
//! scripted logs and archives. Archive reads are chunked to exercise
//! drain-to-completion in the filter.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RunnerError;
use crate::runtime::{ContainerId, ContainerRuntime};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    next_id: usize,
    stdin: Vec<u8>,
    logs: Vec<u8>,
    archives: HashMap<String, Vec<u8>>,
    put_archives: Vec<(String, Vec<u8>)>,
    fail_stdin_after: Option<usize>,
    fail_logs: bool,
    chunk_size: usize,
}

pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                chunk_size: 7,
                ..FakeState::default()
            })),
        }
    }

    pub fn with_logs(self, logs: &str) -> Self {
        self.state.lock().unwrap().logs = logs.as_bytes().to_vec();
        self
    }

    /// Serve `bytes` for `get_archive(path)`.
    pub fn with_archive(self, path: &str, bytes: Vec<u8>) -> Self {
        self.state.lock().unwrap().archives.insert(path.to_string(), bytes);
        self
    }

    /// Make stdin writes fail once `accepted` bytes have been taken.
    pub fn failing_stdin_after(self, accepted: usize) -> Self {
        self.state.lock().unwrap().fail_stdin_after = Some(accepted);
        self
    }

    pub fn failing_logs(self) -> Self {
        self.state.lock().unwrap().fail_logs = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn stdin_text(&self) -> String {
        String::from_utf8(self.state.lock().unwrap().stdin.clone()).unwrap()
    }

    pub fn put_archives(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().put_archives.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

struct FakeStdin {
    state: Arc<Mutex<FakeState>>,
}

impl Write for FakeStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_stdin_after {
            if state.stdin.len() + buf.len() > limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
            }
        }
        state.stdin.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that hands out at most `chunk` bytes per `read`, mimicking a
/// transport that delivers arbitrary-size pieces.
struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create(&self, image: &str) -> Result<ContainerId, RunnerError> {
        let mut state = self.state.lock().unwrap();
        let id = format!("fake-{}", state.next_id);
        state.next_id += 1;
        state.calls.push(format!("create {}", image));
        Ok(ContainerId::new(id))
    }

    fn start(&self, id: &ContainerId) -> Result<(), RunnerError> {
        self.record(format!("start {}", id));
        Ok(())
    }

    fn attach_stdin(&self, id: &ContainerId) -> Result<Box<dyn Write + Send>, RunnerError> {
        self.record(format!("attach {}", id));
        Ok(Box::new(FakeStdin {
            state: Arc::clone(&self.state),
        }))
    }

    fn wait(&self, id: &ContainerId, _deadline: Option<Duration>) -> Result<i64, RunnerError> {
        self.record(format!("wait {}", id));
        Ok(0)
    }

    fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, RunnerError> {
        self.record(format!("logs {}", id));
        let state = self.state.lock().unwrap();
        if state.fail_logs {
            return Err(RunnerError::Runtime("log retrieval failed".into()));
        }
        Ok(state.logs.clone())
    }

    fn put_archive(&self, id: &ContainerId, path: &str, data: &[u8]) -> Result<(), RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("put_archive {} {}", id, path));
        state.put_archives.push((path.to_string(), data.to_vec()));
        Ok(())
    }

    fn get_archive(
        &self,
        id: &ContainerId,
        path: &str,
    ) -> Result<Box<dyn Read + Send>, RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get_archive {} {}", id, path));
        match state.archives.get(path) {
            Some(bytes) => Ok(Box::new(ChunkedReader {
                data: bytes.clone(),
                pos: 0,
                chunk: state.chunk_size,
            })),
            None => Err(RunnerError::ArchiveRetrieval {
                path: path.to_string(),
                reason: "no such path".into(),
            }),
        }
    }

    fn remove(&self, id: &ContainerId) -> Result<(), RunnerError> {
        self.record(format!("remove {}", id));
        Ok(())
    }
}
