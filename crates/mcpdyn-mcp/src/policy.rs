//! Execution policy derived from registry visibility and sensitivity

use crate::config::{RegistryDefaults, ServerEntry};
use crate::error::{MCPError, Result};
use mcpdyn_types::{PolicyFlags, Sensitivity, Visibility};
use std::time::Duration;

/// Extra attempts after a retryable failure, unless configured otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// What the orchestrator may do with one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Appears in capability listings and can be described
    pub listed: bool,
    /// Callable through `call_tool`
    pub direct_call: bool,
    /// Importable from generated code
    pub code_access: bool,
    /// Direct calls need explicit confirmation
    pub requires_confirmation: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after a retryable failure
    pub max_retries: u32,
    /// Sensitivity the policy was derived from
    pub sensitivity: Sensitivity,
}

impl ExecutionPolicy {
    /// Derive the policy for a registry entry
    #[must_use]
    pub fn derive(entry: &ServerEntry, defaults: &RegistryDefaults) -> Self {
        let meta = entry.meta();
        Self {
            listed: meta.visibility != Visibility::Hidden,
            direct_call: meta.visibility == Visibility::Public,
            code_access: meta.sensitivity != Sensitivity::High,
            requires_confirmation: meta.sensitivity == Sensitivity::High,
            timeout: entry.request_timeout(defaults),
            max_retries: meta
                .max_retries
                .or(defaults.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            sensitivity: meta.sensitivity,
        }
    }

    /// Check a direct `call_tool` invocation
    ///
    /// # Errors
    /// `PolicyDenied` for non-public servers, `ConfirmationRequired` for
    /// high-sensitivity servers called without `confirm`
    pub fn check_direct_call(&self, server: &str, tool: &str, confirm: bool) -> Result<()> {
        if !self.direct_call {
            return Err(MCPError::PolicyDenied {
                server: server.into(),
                action: format!("direct call of '{tool}'"),
                reason: "server is not public; use generated code".into(),
            });
        }
        if self.requires_confirmation && !confirm {
            return Err(MCPError::ConfirmationRequired {
                server: server.into(),
                tool: tool.into(),
            });
        }
        Ok(())
    }

    /// Check access from generated code
    ///
    /// # Errors
    /// `PolicyDenied` for high-sensitivity servers
    pub fn check_code_access(&self, server: &str) -> Result<()> {
        if self.code_access {
            Ok(())
        } else {
            Err(MCPError::PolicyDenied {
                server: server.into(),
                action: "code access".into(),
                reason: format!("sensitivity is {}", self.sensitivity),
            })
        }
    }

    /// Whether calls should leave an audit trail
    #[must_use]
    pub fn audited(&self) -> bool {
        self.sensitivity >= Sensitivity::Medium
    }

    /// Flags as shown to callers
    #[must_use]
    pub fn flags(&self, server: &str) -> PolicyFlags {
        PolicyFlags {
            direct_call: self.direct_call,
            code_access: self.code_access,
            requires_confirmation: self.requires_confirmation,
            module: self.code_access.then(|| module_specifier(server)),
        }
    }
}

/// Virtual module specifier for a server id
#[must_use]
pub fn module_specifier(server: &str) -> String {
    format!("mcp/{server}")
}
