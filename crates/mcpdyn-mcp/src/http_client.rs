//! JSON-RPC over HTTP POST for remote MCP servers.
//!
//! Each message is POSTed on its own. Servers may answer with a plain JSON
//! body or with an SSE stream that carries the response as a `data:` event.
//! Some servers return `200 OK` with an empty body instead of `202 Accepted`
//! for notifications; both are treated as accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MCPError, Result};
use crate::jsonrpc::{notification_message, request_message, rpc_error, Incoming};

/// Header names used by MCP Streamable HTTP protocol
const HEADER_SESSION_ID: &str = "mcp-session-id";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";

/// Timeout applied to notifications, which have no caller-supplied deadline
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport for one server
pub struct HttpTransport {
    server: String,
    url: String,
    headers: HeaderMap,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

enum PostOutcome {
    Accepted,
    Body {
        content_type: String,
        body: String,
    },
}

impl HttpTransport {
    /// Build a transport; headers are validated up front
    ///
    /// # Errors
    /// Returns `Config` if a header name or value is invalid
    pub fn new(server: &str, url: &str, headers: &HashMap<String, String>) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MCPError::Config(format!("Invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| MCPError::Config(format!("Invalid value for header '{name}': {e}")))?;
            header_map.insert(name, value);
        }

        if !header_map.contains_key(reqwest::header::AUTHORIZATION) {
            debug!("No Authorization header configured for HTTP server '{}'", server);
        }

        Ok(Self {
            server: server.into(),
            url: url.into(),
            headers: header_map,
            client: reqwest::Client::new(),
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    /// Returns `RequestTimeout`, `Transport`, `AuthRequired`, `InvalidResponse`
    /// or `Rpc`
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = request_message(id, method, params)?;

        let outcome = tokio::time::timeout(timeout, self.post(message))
            .await
            .map_err(|_| MCPError::RequestTimeout {
                server: self.server.clone(),
                method: method.into(),
                timeout,
            })??;

        let (content_type, body) = match outcome {
            PostOutcome::Accepted => {
                return Err(self.invalid(format!(
                    "request '{method}' was accepted without a response body"
                )))
            }
            PostOutcome::Body { content_type, body } => (content_type, body),
        };

        let incoming = if content_type.starts_with(EVENT_STREAM_MIME_TYPE) {
            find_sse_response(&body, id)
        } else if content_type.starts_with(JSON_MIME_TYPE) {
            Incoming::parse(&body)
        } else {
            return Err(self.invalid(format!("unexpected content type '{content_type}'")));
        };

        match incoming {
            Some(Incoming::Response { outcome, .. }) => {
                outcome.map_err(|e| rpc_error(&self.server, e))
            }
            _ => Err(self.invalid(format!("no response for request {id} in body"))),
        }
    }

    /// Send a notification
    ///
    /// # Errors
    /// Returns `Transport` on HTTP failures
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let message = notification_message(method, params)?;
        tokio::time::timeout(NOTIFY_TIMEOUT, self.post(message))
            .await
            .map_err(|_| MCPError::RequestTimeout {
                server: self.server.clone(),
                method: method.into(),
                timeout: NOTIFY_TIMEOUT,
            })??;
        Ok(())
    }

    async fn post(&self, message: String) -> Result<PostOutcome> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(
                reqwest::header::ACCEPT,
                [JSON_MIME_TYPE, EVENT_STREAM_MIME_TYPE].join(", "),
            )
            .header(reqwest::header::CONTENT_TYPE, JSON_MIME_TYPE);
        if let Some(session_id) = self.session_id.read().await.as_deref() {
            request = request.header(HEADER_SESSION_ID, session_id);
        }

        let response = request
            .body(message)
            .send()
            .await
            .map_err(|e| self.transport(format!("POST {} failed: {e}", self.url)))?;

        let status = response.status();
        debug!(server = %self.server, %status, "MCP HTTP response received");

        if let Some(session) = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            return Err(MCPError::AuthRequired {
                server: self.server.clone(),
                challenge,
            });
        }

        if matches!(
            status,
            reqwest::StatusCode::ACCEPTED | reqwest::StatusCode::NO_CONTENT
        ) {
            return Ok(PostOutcome::Accepted);
        }

        if !status.is_success() {
            return Err(self.transport(format!("HTTP status {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .map(|ct| String::from_utf8_lossy(ct.as_bytes()).to_string());

        // Compatibility fix: 200 OK with no content-type -> Accepted
        let Some(content_type) = content_type else {
            debug!("200 OK with no content-type, treating as Accepted");
            return Ok(PostOutcome::Accepted);
        };

        let body = response
            .text()
            .await
            .map_err(|e| self.transport(format!("failed to read body: {e}")))?;
        Ok(PostOutcome::Body { content_type, body })
    }

    fn transport(&self, reason: String) -> MCPError {
        MCPError::Transport {
            server: self.server.clone(),
            reason,
        }
    }

    fn invalid(&self, details: String) -> MCPError {
        MCPError::InvalidResponse {
            server: self.server.clone(),
            details,
        }
    }
}

/// Scan an SSE body for the response carrying `id`
///
/// Events are separated by blank lines; multi-line `data:` fields are joined
/// with `\n` before parsing.
fn find_sse_response(body: &str, id: u64) -> Option<Incoming> {
    let mut data = String::new();
    let mut lines = body.lines().chain(std::iter::once(""));
    loop {
        let line = lines.next()?;
        if line.is_empty() {
            if !data.is_empty() {
                if let Some(Incoming::Response {
                    id: msg_id,
                    outcome,
                }) = Incoming::parse(&data)
                {
                    if msg_id.as_u64() == Some(id) {
                        return Some(Incoming::Response {
                            id: msg_id,
                            outcome,
                        });
                    }
                }
                data.clear();
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
}
