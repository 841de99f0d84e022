//! JSON-RPC 2.0 framing over newline-delimited streams
//!
//! [`RpcConnection`] owns the write half of a stream and a reader task on the
//! read half. Outgoing requests get connection-local increasing ids; the
//! reader task resolves the matching pending sender when a response arrives,
//! in whatever order the server answers.

use crate::error::{MCPError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Protocol version string carried in every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Serialize)]
struct OutgoingRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OutgoingNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Error code
    pub code: i64,
    /// Short description
    pub message: String,
    /// Optional extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A classified incoming message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests
    Response {
        /// Echoed id (`null` for parse-error responses)
        id: Value,
        /// `result` or `error`
        outcome: std::result::Result<Value, RpcErrorObject>,
    },
    /// Request from the peer that expects an answer
    Request {
        /// Peer-chosen id
        id: Value,
        /// Method name
        method: String,
        /// Parameters
        params: Option<Value>,
    },
    /// Fire-and-forget message from the peer
    Notification {
        /// Method name
        method: String,
        /// Parameters
        params: Option<Value>,
    },
}

impl Incoming {
    /// Parse one line; `None` if it is not JSON or not a JSON-RPC message
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        Self::from_value(value)
    }

    /// Classify an already-parsed message
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            return None;
        };

        let id = obj.remove("id").filter(|id| !id.is_null());
        let params = obj.remove("params");

        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            let method = method.to_string();
            return Some(match id {
                Some(id) => Incoming::Request { id, method, params },
                None => Incoming::Notification { method, params },
            });
        }

        if let Some(error) = obj.remove("error").filter(|e| !e.is_null()) {
            let error = serde_json::from_value::<RpcErrorObject>(error.clone()).unwrap_or(
                RpcErrorObject {
                    code: INTERNAL_ERROR,
                    message: error.to_string(),
                    data: None,
                },
            );
            return Some(Incoming::Response {
                id: id.unwrap_or(Value::Null),
                outcome: Err(error),
            });
        }

        obj.remove("result").map(|result| Incoming::Response {
            id: id.unwrap_or(Value::Null),
            outcome: Ok(result),
        })
    }
}

/// Build a success response
#[must_use]
pub fn success_response(id: Value, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

/// Build an error response
#[must_use]
pub fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

/// Build a request message (used by transports that do not keep a stream)
pub(crate) fn request_message(id: u64, method: &str, params: Option<Value>) -> Result<String> {
    Ok(serde_json::to_string(&OutgoingRequest {
        jsonrpc: JSONRPC_VERSION,
        id,
        method,
        params,
    })?)
}

/// Build a notification message
pub(crate) fn notification_message(method: &str, params: Option<Value>) -> Result<String> {
    Ok(serde_json::to_string(&OutgoingNotification {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
    })?)
}

/// Map a JSON-RPC error object onto [`MCPError`]
pub(crate) fn rpc_error(server: &str, error: RpcErrorObject) -> MCPError {
    MCPError::Rpc {
        server: server.into(),
        code: error.code,
        message: error.message,
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;
type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// A JSON-RPC connection over a byte stream pair
pub struct RpcConnection {
    server: String,
    writer: SharedWriter,
    pending: Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl RpcConnection {
    /// Wrap a stream pair and start the reader task
    pub fn new<R, W>(server: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let server = server.into();
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let pending = Arc::new(Mutex::new(PendingMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            server.clone(),
            reader,
            Arc::clone(&writer),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            server,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader_task,
        }
    }

    /// Whether the read side has ended
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    /// Returns `RequestTimeout` if no response arrives in time,
    /// `ServerDisconnected` if the stream closes first, or `Rpc` if the
    /// server answers with an error object
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        // The reader marks the connection closed before draining, so a request
        // registered after the drain is caught here.
        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(MCPError::ServerDisconnected {
                server: self.server.clone(),
            });
        }

        let line = request_message(id, method, params)?;
        debug!(server = %self.server, id, method, "-> request");
        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MCPError::ServerDisconnected {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(MCPError::RequestTimeout {
                    server: self.server.clone(),
                    method: method.into(),
                    timeout,
                })
            }
        }
    }

    /// Send a notification (no response expected)
    ///
    /// # Errors
    /// Returns an error if the stream is closed or the write fails
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(MCPError::ServerDisconnected {
                server: self.server.clone(),
            });
        }
        let line = notification_message(method, params)?;
        debug!(server = %self.server, method, "-> notification");
        self.write_line(&line).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        write_line(&self.writer, line)
            .await
            .map_err(|e| MCPError::Transport {
                server: self.server.clone(),
                reason: format!("write failed: {e}"),
            })
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn write_line(writer: &SharedWriter, line: &str) -> std::io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn read_loop<R>(
    server: String,
    reader: R,
    writer: SharedWriter,
    pending: Arc<Mutex<PendingMap>>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&server, &line, &writer, &pending).await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(server = %server, "Read error: {}", e);
                break;
            }
        }
    }

    debug!(server = %server, "Connection closed");
    closed.store(true, Ordering::SeqCst);
    let mut pending = pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(MCPError::ServerDisconnected {
            server: server.clone(),
        }));
    }
}

async fn handle_line(
    server: &str,
    line: &str,
    writer: &SharedWriter,
    pending: &Arc<Mutex<PendingMap>>,
) {
    match Incoming::parse(line) {
        Some(Incoming::Response { id, outcome }) => {
            let Some(id) = id.as_u64() else {
                debug!(server, %id, "Response with foreign id, dropping");
                return;
            };
            let sender = pending.lock().await.remove(&id);
            match sender {
                Some(tx) => {
                    debug!(server, id, "<- response");
                    let _ = tx.send(outcome.map_err(|e| rpc_error(server, e)));
                }
                None => debug!(server, id, "Response for unknown or expired request"),
            }
        }
        Some(Incoming::Request { id, method, .. }) => {
            let reply = if method == "ping" {
                success_response(id, serde_json::json!({}))
            } else {
                debug!(server, method = %method, "Server request not supported");
                error_response(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
            };
            if let Err(e) = write_line(writer, &reply.to_string()).await {
                warn!(server, "Failed to answer server request: {}", e);
            }
        }
        Some(Incoming::Notification { method, .. }) => {
            debug!(server, method = %method, "<- notification");
        }
        None => debug!(server, "Skipping non JSON-RPC line: {}", line),
    }
}
