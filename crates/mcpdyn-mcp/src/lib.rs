//! `mcpdyn` MCP orchestration library
//!
//! Loads a registry of MCP servers and routes discovery, tool calls and
//! generated programs to them on demand.
//!
//! ## Features
//!
//! - stdio and HTTP (JSON or SSE) transports, started lazily and pooled
//! - JSON-RPC correlation with per-request timeouts and retry on a fresh connection
//! - Visibility / sensitivity execution policy with confirmation for risky calls
//! - Tool discovery cache with a TTL
//! - Declarative code sandbox importing servers as `mcp/<id>` modules
//! - Stdio MCP server facade exposing the orchestrator itself
//! - Zero unsafe code

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "http")]
pub mod http_client;
pub mod jsonrpc;
pub mod orchestrator;
pub mod policy;
pub mod sandbox;
pub mod server;
pub mod transport;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod testing;

pub use client::MCPClient;
pub use config::{MCPRegistry, ServerEntry, TransportConfig, TransportType};
pub use error::{MCPError, Result};
pub use orchestrator::{CallOptions, Connector, MCPOrchestrator, OrchestratorOptions};
pub use policy::ExecutionPolicy;
pub use sandbox::{ExecutionReport, ModuleMap, Sandbox, SandboxLimits, StepResult, ToolInvoker};
pub use server::OrchestratorServer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CallOptions, ExecutionReport, MCPError, MCPOrchestrator, MCPRegistry,
        OrchestratorOptions, OrchestratorServer,
    };
}
