use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Sensitivity, ToolDescriptor, TransportKind, Visibility};

/// Policy flags as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFlags {
    pub direct_call: bool,
    pub code_access: bool,
    pub requires_confirmation: bool,
    /// Virtual module specifier when the server is reachable from code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// One server in a capabilities listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapability {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub transport: TransportKind,
    pub visibility: Visibility,
    pub sensitivity: Sensitivity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub policy: PolicyFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
    /// Set when tool discovery failed for this server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full description of one server and its tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescription {
    pub server: ServerCapability,
    pub tools: Vec<ToolDescriptor>,
    pub fetched_at: DateTime<Utc>,
    /// True when the tools were served from the discovery cache
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

impl ServerDescription {
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}
