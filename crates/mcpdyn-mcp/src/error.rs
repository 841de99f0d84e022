//! Error types for orchestrator operations

use std::time::Duration;
use thiserror::Error;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum MCPError {
    /// Transport-level error (connection, I/O, HTTP status)
    #[error("Transport error on '{server}': {reason}")]
    Transport {
        /// Server id
        server: String,
        /// Failure reason
        reason: String,
    },

    /// HTTP server rejected the request with `401 Unauthorized`
    #[error("Server '{server}' requires authentication (www-authenticate: {challenge})")]
    AuthRequired {
        /// Server id
        server: String,
        /// `WWW-Authenticate` challenge, or `none`
        challenge: String,
    },

    /// Server failed to start
    #[error("Server '{server}' failed to start: {reason}")]
    StartupFailed {
        /// Server id
        server: String,
        /// Failure reason
        reason: String,
    },

    /// Startup (spawn + handshake) exceeded its timeout
    #[error("Server '{server}' did not finish startup within {timeout:?}")]
    StartupTimeout {
        /// Server id
        server: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// A single request exceeded its timeout
    #[error("Request '{method}' to '{server}' timed out after {timeout:?}")]
    RequestTimeout {
        /// Server id
        server: String,
        /// JSON-RPC method
        method: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// No enabled, visible server with this id
    #[error("Server '{0}' not found in registry")]
    ServerNotFound(String),

    /// Tool not found on server
    #[error("Tool '{tool}' not found on server '{server}'")]
    ToolNotFound {
        /// Server id
        server: String,
        /// Tool name
        tool: String,
    },

    /// Arguments are missing keys the tool schema requires
    #[error("Tool '{tool}' is missing required arguments: {}", missing.join(", "))]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// Missing argument names
        missing: Vec<String>,
    },

    /// Server closed the connection
    #[error("Server '{server}' disconnected")]
    ServerDisconnected {
        /// Server id
        server: String,
    },

    /// JSON-RPC error object returned by the server
    #[error("Server '{server}' returned RPC error {code}: {message}")]
    Rpc {
        /// Server id
        server: String,
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Tool ran but reported failure
    #[error("Tool '{tool}' on '{server}' failed: {reason}")]
    ToolExecution {
        /// Server id
        server: String,
        /// Tool name
        tool: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid response from server
    #[error("Invalid response from server '{server}': {details}")]
    InvalidResponse {
        /// Server id
        server: String,
        /// Error details
        details: String,
    },

    /// Execution policy refused the operation
    #[error("Policy denied {action} on '{server}': {reason}")]
    PolicyDenied {
        /// Server id
        server: String,
        /// What was attempted
        action: String,
        /// Why it was refused
        reason: String,
    },

    /// High-sensitivity call made without confirmation
    #[error("Calling '{tool}' on '{server}' requires confirmation")]
    ConfirmationRequired {
        /// Server id
        server: String,
        /// Tool name
        tool: String,
    },

    /// Generated code imported a module that is not in the module map
    #[error("Module '{module}' is not available (available: {})", available.join(", "))]
    ModuleNotFound {
        /// Requested module specifier
        module: String,
        /// Specifiers that are available
        available: Vec<String>,
    },

    /// Generated code is malformed or failed while running
    #[error("Program error: {0}")]
    Program(String),

    /// Generated code exceeded its overall deadline
    #[error("Program exceeded its {0:?} deadline")]
    SandboxTimeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MCPError {
    /// Whether a fresh connection might make the same request succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MCPError::Transport { .. }
                | MCPError::RequestTimeout { .. }
                | MCPError::ServerDisconnected { .. }
                | MCPError::StartupFailed { .. }
                | MCPError::StartupTimeout { .. }
        )
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, MCPError>;
