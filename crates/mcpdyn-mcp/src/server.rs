//! Stdio MCP server exposing the orchestrator as four tools
//!
//! Requests are handled one at a time in arrival order.

use crate::error::{MCPError, Result};
use crate::jsonrpc::{
    error_response, success_response, Incoming, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::orchestrator::{CallOptions, MCPOrchestrator};
use rmcp::model::{CallToolResult, Content};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Protocol version answered to `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const LIST_CAPABILITIES: &str = "list_mcp_capabilities";
const DESCRIBE: &str = "describe_mcp";
const CALL_TOOL: &str = "call_mcp_tool";
const EXECUTE_CODE: &str = "execute_mcp_code";

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListArgs {
    #[serde(default)]
    include_tools: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DescribeArgs {
    server: String,
    #[serde(default)]
    refresh: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CallArgs {
    server: String,
    tool: String,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    confirm: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecArgs {
    code: String,
    #[serde(default)]
    input: Value,
}

/// Bad request parameters, answered with `-32602`
struct InvalidParams(String);

/// Serves orchestrator tools over JSON-RPC
pub struct OrchestratorServer {
    orchestrator: Arc<MCPOrchestrator>,
}

impl OrchestratorServer {
    /// Wrap an orchestrator
    #[must_use]
    pub fn new(orchestrator: Arc<MCPOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Read requests from `reader` until EOF, answering on `writer`
    ///
    /// # Errors
    /// Returns an error if reading or writing the streams fails
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Serving orchestrator tools over stdio");
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!("Client closed the stream, stopping");
        Ok(())
    }

    /// Handle one incoming line; `None` when no answer is due
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            warn!("Unparsable request line");
            return Some(error_response(Value::Null, PARSE_ERROR, "Parse error"));
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        match Incoming::from_value(value) {
            Some(Incoming::Request { id, method, params }) => {
                Some(self.handle_request(id, &method, params).await)
            }
            Some(Incoming::Notification { method, .. }) => {
                debug!("Notification '{}'", method);
                None
            }
            Some(Incoming::Response { .. }) => {
                debug!("Ignoring unexpected response");
                None
            }
            None => Some(error_response(id, INVALID_REQUEST, "Invalid request")),
        }
    }

    async fn handle_request(&self, id: Value, method: &str, params: Option<Value>) -> Value {
        debug!("Request '{}'", method);
        match method {
            "initialize" => success_response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "mcpdyn", "version": env!("CARGO_PKG_VERSION") }
                }),
            ),
            "ping" => success_response(id, json!({})),
            "tools/list" => success_response(id, json!({ "tools": tool_definitions() })),
            "tools/call" => match self.call(params).await {
                Ok(result) => success_response(id, result),
                Err(InvalidParams(message)) => error_response(id, INVALID_PARAMS, message),
            },
            other => error_response(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        }
    }

    async fn call(&self, params: Option<Value>) -> std::result::Result<Value, InvalidParams> {
        let params: ToolCallParams = parse_params(params.unwrap_or(Value::Null))?;
        let orch = &self.orchestrator;

        let outcome = match params.name.as_str() {
            LIST_CAPABILITIES => {
                let args: ListArgs = parse_params(params.arguments)?;
                to_json(orch.list_capabilities(args.include_tools).await)
            }
            DESCRIBE => {
                let args: DescribeArgs = parse_params(params.arguments)?;
                orch.describe(&args.server, args.refresh)
                    .await
                    .and_then(to_json)
            }
            CALL_TOOL => {
                let args: CallArgs = parse_params(params.arguments)?;
                orch.call_tool(
                    &args.server,
                    &args.tool,
                    args.arguments,
                    CallOptions {
                        confirm: args.confirm,
                    },
                )
                .await
            }
            EXECUTE_CODE => {
                let args: ExecArgs = parse_params(params.arguments)?;
                match orch.execute_code(&args.code, args.input).await {
                    Ok(report) if !report.success => {
                        return Ok(tool_result(to_json(report), true));
                    }
                    other => other.and_then(to_json),
                }
            }
            other => return Err(InvalidParams(format!("Unknown tool: {other}"))),
        };

        let is_error = outcome.is_err();
        Ok(tool_result(outcome, is_error))
    }
}

/// Missing or `null` params count as an empty object
fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, InvalidParams> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| InvalidParams(format!("Invalid params: {e}")))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn tool_result(outcome: Result<Value>, is_error: bool) -> Value {
    let text = match &outcome {
        Ok(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        Err(e) => describe_error(e),
    };
    let result = if is_error {
        CallToolResult::error(vec![Content::text(text)])
    } else {
        CallToolResult::success(vec![Content::text(text)])
    };
    serde_json::to_value(result).unwrap_or_else(|_| json!({ "content": [], "isError": true }))
}

fn describe_error(e: &MCPError) -> String {
    match e {
        MCPError::ConfirmationRequired { .. } => {
            format!("{e}. Repeat the call with \"confirm\": true once the user agrees.")
        }
        MCPError::AuthRequired { .. } => {
            format!("{e}. Add an Authorization header for this server in the registry.")
        }
        MCPError::PolicyDenied { .. } => {
            format!("{e}. Use {EXECUTE_CODE} for servers that are reachable from code.")
        }
        other => other.to_string(),
    }
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": LIST_CAPABILITIES,
            "description": "List the MCP servers in the registry with their policy flags. \
                            Set include_tools to also discover each server's tools.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "include_tools": { "type": "boolean", "default": false }
                }
            }
        },
        {
            "name": DESCRIBE,
            "description": "Describe one server and the full schema of its tools.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server": { "type": "string" },
                    "refresh": { "type": "boolean", "default": false }
                },
                "required": ["server"]
            }
        },
        {
            "name": CALL_TOOL,
            "description": "Call one tool on a public server. High-sensitivity servers \
                            need confirm set to true.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "server": { "type": "string" },
                    "tool": { "type": "string" },
                    "arguments": { "type": "object" },
                    "confirm": { "type": "boolean", "default": false }
                },
                "required": ["server", "tool"]
            }
        },
        {
            "name": EXECUTE_CODE,
            "description": "Run a JSON or YAML program that imports servers as mcp/<id> \
                            modules and chains their tools.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "code": { "type": "string" },
                    "input": {}
                },
                "required": ["code"]
            }
        }
    ])
}
