//! In-process MCP server used by unit tests
//!
//! Tool behaviour by name: `fail` reports an error, `plain` returns non-JSON
//! text, `multi` returns two content items, `structured` returns
//! `structuredContent`, `slow` never answers, anything else echoes its
//! arguments.

use crate::config::TransportType;
use crate::error::Result;
use crate::orchestrator::Connector;
use crate::transport::{StdioTransport, Transport};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Clone, Default)]
pub(crate) struct MockServer {
    tools: Vec<Value>,
    page_size: Option<usize>,
    drops_remaining: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tool(mut self, name: &str, required: &[&str]) -> Self {
        let properties: serde_json::Map<String, Value> = required
            .iter()
            .map(|r| ((*r).to_string(), json!({ "type": "string" })))
            .collect();
        self.tools.push(json!({
            "name": name,
            "description": format!("{name} tool"),
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }));
        self
    }

    pub(crate) fn paginate(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Close the connection instead of answering the next `n` tool calls
    pub(crate) fn drop_first_calls(self, n: usize) -> Self {
        self.drops_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Tool calls answered so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Connections opened so far
    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn transport(&self, name: &str) -> Transport {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        self.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(self.clone().run(name.to_string(), server_io));
        Transport::Stdio(StdioTransport::from_streams(name, client_read, client_write))
    }

    /// Connector that hands every server a fresh in-process connection
    pub(crate) fn connector(&self) -> Connector {
        let mock = self.clone();
        Arc::new(
            move |server: String, _transport: TransportType| -> BoxFuture<'static, Result<Transport>> {
                let mock = mock.clone();
                Box::pin(async move { Ok(mock.transport(&server)) })
            },
        )
    }

    async fn run(self, name: String, io: tokio::io::DuplexStream) {
        let (reader, mut writer) = tokio::io::split(io);
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let method = msg["method"].as_str().unwrap_or_default();
            let params = msg.get("params").cloned().unwrap_or(Value::Null);

            let reply = match method {
                "initialize" => ok(
                    id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": name, "version": "0.0.1" }
                    }),
                ),
                "tools/list" => ok(id, self.list_page(&params)),
                "tools/call" => {
                    if self
                        .drops_remaining
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok()
                    {
                        return;
                    }
                    let tool = params["name"].as_str().unwrap_or_default().to_string();
                    if tool == "slow" {
                        continue;
                    }
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    ok(id, call_result(&tool, params.get("arguments").cloned()))
                }
                other => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("Method not found: {other}") }
                }),
            };

            if writer
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    }

    fn list_page(&self, params: &Value) -> Value {
        let start: usize = params
            .get("cursor")
            .and_then(Value::as_str)
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let size = self.page_size.unwrap_or(self.tools.len().max(1));
        let end = (start + size).min(self.tools.len());
        let mut page = json!({ "tools": self.tools[start.min(end)..end].to_vec() });
        if end < self.tools.len() {
            page["nextCursor"] = json!(end.to_string());
        }
        page
    }
}

fn ok(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn text(t: &str) -> Value {
    json!({ "type": "text", "text": t })
}

fn call_result(tool: &str, arguments: Option<Value>) -> Value {
    match tool {
        "fail" => json!({ "content": [text("boom")], "isError": true }),
        "plain" => json!({ "content": [text("plain text")] }),
        "multi" => json!({ "content": [text("1"), text("two")] }),
        "structured" => json!({
            "content": [text("3 rows")],
            "structuredContent": { "rows": 3 }
        }),
        _ => {
            let echo = json!({ "tool": tool, "arguments": arguments.unwrap_or(Value::Null) });
            json!({ "content": [text(&echo.to_string())] })
        }
    }
}

/// One-shot HTTP server answering canned responses in order, one per connection
#[cfg(feature = "http")]
pub(crate) struct HttpFixture {
    pub(crate) url: String,
    requests: Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(feature = "http")]
impl HttpFixture {
    pub(crate) async fn start(responses: Vec<String>) -> Self {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());
        let requests = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            for response in responses {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let mut reader = BufReader::new(stream);
                let mut head = String::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap_or(0);
                        }
                    }
                    head.push_str(&line.to_ascii_lowercase());
                }
                let mut body = vec![0; content_length];
                let _ = reader.read_exact(&mut body).await;
                log.lock().unwrap().push(head);

                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests }
    }

    /// Lowercased request heads received so far
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Raw HTTP/1.1 response that closes its connection
#[cfg(feature = "http")]
pub(crate) fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status}\r\nconnection: close\r\n");
    if !status.starts_with("204") {
        out.push_str(&format!("content-length: {}\r\n", body.len()));
    }
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}
