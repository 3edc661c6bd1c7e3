//! Line-delimited JSON-RPC 2.0 client for worker channels.
//!
//! Each worker process speaks JSON-RPC 2.0 over its standard input and
//! output, one JSON object per line. [`RpcChannel`] owns one such pair of
//! pipes and issues strictly serial request/response calls over it — the
//! engine protocol does not support pipelining, and the pool's busy flag
//! already guarantees a single caller per worker at a time.
//!
//! The channel is constructed over any `AsyncRead`/`AsyncWrite` pair, so
//! tests can drive it through in-memory duplex pipes instead of a process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::trace;

use kiln_core::{KilnError, Result};

/// Request/response RPC client bound to one worker's stdin/stdout.
pub struct RpcChannel {
    io: Mutex<ChannelIo>,
    next_id: AtomicU64,
}

struct ChannelIo {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

#[derive(Serialize)]
struct Request<'a, A: ?Sized> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a A,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

impl RpcChannel {
    /// Build a channel over a raw read/write pair.
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            io: Mutex::new(ChannelIo {
                reader: BufReader::new(Box::new(reader)),
                writer: Box::new(writer),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue one remote procedure call and await its response.
    ///
    /// I/O failures and EOF map to [`KilnError::Transport`] (the worker died
    /// mid-call); malformed or out-of-order frames map to
    /// [`KilnError::Protocol`]; a JSON-RPC error object maps to
    /// [`KilnError::Rpc`] carrying the remote code and message unchanged.
    pub async fn call<A, R>(&self, method: &str, params: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        })
        .map_err(|e| KilnError::protocol(format!("failed to encode {method} request: {e}")))?;
        line.push('\n');

        let mut io = self.io.lock().await;

        io.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| KilnError::transport(method, format!("write failed: {e}")))?;
        io.writer
            .flush()
            .await
            .map_err(|e| KilnError::transport(method, format!("flush failed: {e}")))?;
        trace!(method, id, "request written");

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = io
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|e| KilnError::transport(method, format!("read failed: {e}")))?;
            if n == 0 {
                return Err(KilnError::transport(method, "worker closed the connection"));
            }

            let trimmed = buf.trim_end();
            if trimmed.is_empty() {
                continue;
            }

            let response: Response = serde_json::from_str(trimmed).map_err(|e| {
                KilnError::protocol(format!("unparseable frame from worker: {e}"))
            })?;

            match response.id {
                // Server-initiated notifications carry no id; skip them.
                None => continue,
                Some(got) if got != id => {
                    return Err(KilnError::protocol(format!(
                        "response id {got} does not match request id {id}"
                    )));
                }
                Some(_) => {}
            }

            if let Some(err) = response.error {
                return Err(KilnError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }

            let value = response.result.unwrap_or(serde_json::Value::Null);
            return serde_json::from_value(value).map_err(|e| {
                KilnError::protocol(format!("unexpected {method} result shape: {e}"))
            });
        }
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
