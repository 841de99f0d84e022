//! MCP client over a [`Transport`]
//!
//! Provides [`MCPClient`] for performing the MCP handshake, discovering
//! available tools, and executing tool calls. Wire payloads are decoded with
//! the rmcp schema types.

use crate::config::TransportType;
use crate::error::{MCPError, Result};
use crate::transport::Transport;
use mcpdyn_types::ToolDescriptor;
use rmcp::model::{CallToolResult, ClientInfo, ListToolsResult};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Protocol version assumed when a server omits it from `initialize`
const FALLBACK_PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages, against servers that never stop paging
const MAX_TOOL_PAGES: usize = 100;

/// Handle to an initialized MCP server connection
pub struct MCPClient {
    /// Registry id of the server
    pub name: String,
    /// Protocol version the server answered with
    pub protocol_version: String,
    /// `serverInfo.name` reported by the server
    pub server_info: Option<String>,
    transport: Transport,
}

/// Arguments as sent in `tools/call`
///
/// Objects pass through and `null` means no arguments. Any other value is
/// wrapped as `{"input": value}`.
pub(crate) fn normalize_arguments(args: Value) -> Value {
    match args {
        Value::Object(_) | Value::Null => args,
        other => serde_json::json!({ "input": other }),
    }
}

/// Build the `ClientInfo` advertised during MCP initialization
fn client_info() -> ClientInfo {
    let mut info = ClientInfo::default();
    info.client_info.name = "mcpdyn".into();
    info.client_info.version = env!("CARGO_PKG_VERSION").into();
    info
}

impl MCPClient {
    /// Open a transport and initialize the server
    ///
    /// Spawning (or connecting) and the handshake share one deadline.
    ///
    /// # Errors
    /// Returns `StartupTimeout` if the deadline passes, or the underlying
    /// transport / handshake error
    pub async fn start(
        name: &str,
        transport: &TransportType,
        startup_timeout: Duration,
    ) -> Result<Self> {
        info!("Starting MCP server '{}' with timeout {:?}", name, startup_timeout);

        tokio::time::timeout(startup_timeout, async {
            let transport = Transport::open(name, transport).await?;
            Self::handshake(name, transport, startup_timeout).await
        })
        .await
        .map_err(|_| MCPError::StartupTimeout {
            server: name.into(),
            timeout: startup_timeout,
        })?
    }

    /// Run `initialize` + `notifications/initialized` over an open transport
    ///
    /// # Errors
    /// Returns an error if the server rejects or never answers `initialize`
    pub async fn handshake(name: &str, transport: Transport, timeout: Duration) -> Result<Self> {
        let params = serde_json::to_value(client_info())?;
        let result = transport
            .request("initialize", Some(params), timeout)
            .await?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_PROTOCOL_VERSION)
            .to_string();
        let server_info = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .map(str::to_string);

        transport.notify("notifications/initialized", None).await?;

        info!(
            "MCP server '{}' initialized (protocol {}, server {:?})",
            name, protocol_version, server_info
        );

        Ok(Self {
            name: name.into(),
            protocol_version,
            server_info,
            transport,
        })
    }

    /// Whether the connection can still carry requests
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Discover all tools, following `nextCursor` pagination
    ///
    /// # Errors
    /// Returns an error if a page request fails or cannot be decoded
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let raw = self.transport.request("tools/list", params, timeout).await?;
            let page: ListToolsResult =
                serde_json::from_value(raw).map_err(|e| MCPError::InvalidResponse {
                    server: self.name.clone(),
                    details: format!("tools/list: {e}"),
                })?;

            tools.extend(page.tools.into_iter().map(|t| {
                debug!("  Tool '{}': {:?}", t.name, t.description);
                ToolDescriptor {
                    name: t.name.to_string(),
                    description: t.description.map(|d| d.to_string()),
                    input_schema: serde_json::to_value(&t.input_schema).unwrap_or_default(),
                }
            }));

            match page.next_cursor.map(|c| c.to_string()) {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => {
                    info!("Discovered {} tools from '{}'", tools.len(), self.name);
                    return Ok(tools);
                }
            }
        }

        warn!(
            "Server '{}' still paging after {} tools/list pages, stopping",
            self.name, MAX_TOOL_PAGES
        );
        Ok(tools)
    }

    /// Call a tool on this MCP server
    ///
    /// # Errors
    /// Returns `ToolExecution` if the tool reports an error, or any
    /// transport / RPC error from the request
    pub async fn call_tool(&self, tool_name: &str, args: Value, timeout: Duration) -> Result<Value> {
        debug!("Calling tool '{}' on server '{}'", tool_name, self.name);

        let arguments = match normalize_arguments(args) {
            Value::Object(map) => Some(map),
            _ => None,
        };

        let mut params = serde_json::json!({ "name": tool_name });
        if let Some(arguments) = arguments {
            params["arguments"] = Value::Object(arguments);
        }

        let raw = self
            .transport
            .request("tools/call", Some(params), timeout)
            .await?;
        let result: CallToolResult =
            serde_json::from_value(raw).map_err(|e| MCPError::InvalidResponse {
                server: self.name.clone(),
                details: format!("tools/call: {e}"),
            })?;

        // Text content that parses as JSON becomes JSON, otherwise a string
        let content_values: Vec<Value> = result
            .content
            .iter()
            .filter_map(|content| {
                content.as_text().map(|text| {
                    serde_json::from_str(&text.text)
                        .unwrap_or_else(|_| Value::String(text.text.clone()))
                })
            })
            .collect();

        let output = match (result.structured_content, content_values.len()) {
            (Some(structured), _) => structured,
            (None, 0) => Value::Null,
            (None, 1) => content_values.into_iter().next().unwrap_or(Value::Null),
            (None, _) => Value::Array(content_values),
        };

        if result.is_error.unwrap_or(false) {
            return Err(MCPError::ToolExecution {
                server: self.name.clone(),
                tool: tool_name.into(),
                reason: format!("Tool returned error: {output}"),
            });
        }

        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::MockServer;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn connect(mock: &MockServer) -> MCPClient {
        MCPClient::handshake("mock", mock.transport("mock"), TIMEOUT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_records_server_info() {
        let mock = MockServer::new().tool("echo", &[]);
        let client = connect(&mock).await;
        assert_eq!(client.protocol_version, "2024-11-05");
        assert_eq!(client.server_info.as_deref(), Some("mock"));
        assert!(client.is_alive());
    }

    #[tokio::test]
    async fn test_list_tools_follows_pagination() {
        let mock = MockServer::new()
            .tool("a", &[])
            .tool("b", &["path"])
            .tool("c", &[])
            .paginate(2);
        let client = connect(&mock).await;
        let tools = client.list_tools(TIMEOUT).await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(tools[1].required_args(), vec!["path"]);
    }

    #[tokio::test]
    async fn test_call_tool_parses_json_text() {
        let mock = MockServer::new().tool("echo", &[]);
        let client = connect(&mock).await;
        let out = client
            .call_tool("echo", json!({"q": "rust"}), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out, json!({"tool": "echo", "arguments": {"q": "rust"}}));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_call_tool_wraps_scalar_args() {
        let mock = MockServer::new().tool("echo", &[]);
        let client = connect(&mock).await;
        let out = client.call_tool("echo", json!(5), TIMEOUT).await.unwrap();
        assert_eq!(out["arguments"], json!({"input": 5}));

        let out = client.call_tool("echo", Value::Null, TIMEOUT).await.unwrap();
        assert_eq!(out["arguments"], Value::Null);
    }

    #[tokio::test]
    async fn test_call_tool_plain_and_multi_content() {
        let mock = MockServer::new().tool("plain", &[]).tool("multi", &[]);
        let client = connect(&mock).await;
        let plain = client.call_tool("plain", json!({}), TIMEOUT).await.unwrap();
        assert_eq!(plain, json!("plain text"));
        let multi = client.call_tool("multi", json!({}), TIMEOUT).await.unwrap();
        assert_eq!(multi, json!([1, "two"]));
    }

    #[tokio::test]
    async fn test_structured_content_wins() {
        let mock = MockServer::new().tool("structured", &[]);
        let client = connect(&mock).await;
        let out = client
            .call_tool("structured", json!({}), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out, json!({"rows": 3}));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_tool_execution() {
        let mock = MockServer::new().tool("fail", &[]);
        let client = connect(&mock).await;
        let err = client
            .call_tool("fail", json!({}), TIMEOUT)
            .await
            .unwrap_err();
        match err {
            MCPError::ToolExecution { tool, reason, .. } => {
                assert_eq!(tool, "fail");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
