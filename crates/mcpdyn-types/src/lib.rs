//! mcpdyn Types - Shared types for the MCP dynamic orchestrator
//!
//! This module defines the data types exchanged between the orchestrator,
//! the CLI and the stdio server facade.

use serde::{Deserialize, Serialize};
use std::fmt;

mod server;
mod tool;

pub use server::{PolicyFlags, ServerCapability, ServerDescription};
pub use tool::ToolDescriptor;

/// Who may see a registry entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Listed, describable and directly callable
    #[default]
    Public,
    /// Listed and describable, callable only from generated code
    Internal,
    /// Never listed, reachable only from generated code
    Hidden,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Hidden => "hidden",
        };
        f.write_str(s)
    }
}

/// How much damage a server's tools can do
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Read-only or harmless tools
    #[default]
    Low,
    /// Tools that touch user data; calls are audited
    Medium,
    /// Destructive tools; direct calls need confirmation and code may not import them
    High,
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        };
        f.write_str(s)
    }
}

/// Transport used to reach a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC
    Stdio,
    /// JSON-RPC over HTTP POST
    Http,
}
