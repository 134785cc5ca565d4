//! `run` RPC: JSON-RPC 2.0 over stdio.
//!
//! **Entry**: `tunnel serve --stdio`
//!
//! Request: `{"jsonrpc":"2.0","id":1,"method":"run","params":{...}}`
//! Response: `{"jsonrpc":"2.0","id":1,"result":{...}}` or
//! `{"jsonrpc":"2.0","id":1,"error":{...}}`
//!
//! Every request owns its container, so requests dispatch concurrently
//! through a rayon pool; a dedicated writer thread serialises responses.

use anyhow::Result;
use serde_json::{json, Value};
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{mpsc, Arc};
use std::thread;

use tunnel_core::config::RunnerConfig;
use tunnel_core::protocol::RunRequest;
use tunnel_runner::docker::DockerCli;
use tunnel_runner::Runner;

/// Maximum JSON-RPC request size (10 MB) to prevent OOM DoS.
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Run the stdio RPC daemon until stdin closes.
///
/// Reads JSON-RPC requests from stdin (one per line), writes responses to
/// stdout. Response order follows completion, not arrival.
pub fn serve_stdio() -> Result<()> {
    let runner = Arc::new(Runner::new(DockerCli::new(), RunnerConfig::from_env()));
    tracing::info!("stdio RPC server started");

    let (tx, rx) = mpsc::channel::<(Value, std::result::Result<Value, String>)>();

    // Writer thread: stdout is not shared across the pool.
    let writer_handle = thread::spawn(move || -> Result<()> {
        let mut stdout = io::stdout();
        for (id, result) in rx {
            match result {
                Ok(res) => {
                    let resp = json!({"jsonrpc": "2.0", "id": id, "result": res});
                    writeln!(stdout, "{}", resp)?;
                }
                Err(msg) => {
                    let err_resp = json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32603, "message": msg}
                    });
                    writeln!(stdout, "{}", err_resp)?;
                }
            }
            stdout.flush()?;
        }
        Ok(())
    });

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let mut pending = 0usize;

    loop {
        let line = match read_line_limited(&mut reader) {
            Ok(None) => break, // EOF
            Ok(Some(l)) => l,
            Err(e) => {
                tracing::warn!("oversized or unreadable request: {}", e);
                let _ = tx.send((Value::Null, Err(format!("Request size error: {}", e))));
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("malformed JSON-RPC request: {}", e);
                let _ = tx.send((Value::Null, Err(format!("Parse error: {}", e))));
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let params = request
            .get("params")
            .cloned()
            .unwrap_or(Value::Object(serde_json::Map::new()));

        pending += 1;
        let runner = Arc::clone(&runner);
        let tx = tx.clone();
        let done_tx = done_tx.clone();
        rayon::spawn(move || {
            let result = dispatch_request(&runner, &method, &params);
            let _ = tx.send((id, result.map_err(|e| e.to_string())));
            let _ = done_tx.send(());
        });
    }

    for _ in 0..pending {
        let _ = done_rx.recv();
    }
    drop(tx);
    writer_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Writer thread panicked"))??;
    tracing::info!("stdio RPC server stopped");

    Ok(())
}

fn dispatch_request(runner: &Runner<DockerCli>, method: &str, params: &Value) -> Result<Value> {
    match method {
        "run" => handle_run(runner, params),
        _ => anyhow::bail!("Method not found: {}", method),
    }
}

fn handle_run(runner: &Runner<DockerCli>, params: &Value) -> Result<Value> {
    let request: RunRequest = serde_json::from_value(params.clone())?;
    let response = runner.run(&request)?;
    Ok(serde_json::to_value(response)?)
}

// ─── Size-limited stdin reader ───────────────────────────────────────────────

/// Read a single line from `reader`, enforcing [`MAX_REQUEST_SIZE`].
/// Returns `Ok(None)` on EOF, `Ok(Some(line))` on success.
/// Oversized lines are skipped (bytes discarded) and an error is returned.
fn read_line_limited(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(b) => b,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return if buf.is_empty() {
                Ok(None)
            } else {
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                String::from_utf8(buf)
                    .map(Some)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
            };
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > MAX_REQUEST_SIZE {
                    reader.consume(pos + 1);
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Request exceeds 10MB size limit",
                    ));
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return String::from_utf8(buf)
                    .map(Some)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"));
            }
            None => {
                let len = available.len();
                if buf.len() + len > MAX_REQUEST_SIZE {
                    reader.consume(len);
                    skip_until_newline(reader);
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Request exceeds 10MB size limit",
                    ));
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

/// Discard bytes until a newline or EOF, using only the internal buffer.
fn skip_until_newline(reader: &mut impl BufRead) {
    loop {
        match reader.fill_buf() {
            Ok(b) if b.is_empty() => break,
            Ok(b) => {
                if let Some(pos) = b.iter().position(|&c| c == b'\n') {
                    reader.consume(pos + 1);
                    break;
                }
                let len = b.len();
                reader.consume(len);
            }
            Err(_) => break,
        }
    }
}
