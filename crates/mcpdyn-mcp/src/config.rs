//! Registry types: how to reach each MCP server and how it may be used

use crate::error::{MCPError, Result};
use mcpdyn_types::{Sensitivity, TransportKind, Visibility};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout used when neither the entry nor the registry sets one
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Startup timeout used when neither the entry nor the registry sets one
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 10_000;

/// Registry-wide defaults
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDefaults {
    /// Per-request timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Spawn + handshake timeout in milliseconds
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    /// Extra attempts after a retryable failure
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// A loaded MCP server registry
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MCPRegistry {
    /// Registry-wide defaults
    #[serde(default)]
    pub defaults: RegistryDefaults,

    /// Server entries keyed by id, ordered for deterministic listings
    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,
}

/// Individual registry entry
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ServerEntry {
    /// Simple form: just a command string or URL
    Simple(String),

    /// Advanced form with explicit transport and metadata
    Advanced {
        /// Transport configuration
        #[serde(flatten)]
        transport: TransportConfig,

        /// Usage metadata
        #[serde(flatten)]
        meta: EntryMeta,
    },
}

/// Metadata attached to an advanced entry
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    /// Human readable summary shown in listings
    #[serde(default)]
    pub description: Option<String>,
    /// Who may see the server
    #[serde(default)]
    pub visibility: Visibility,
    /// How dangerous the server's tools are
    #[serde(default)]
    pub sensitivity: Sensitivity,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Override request timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Override startup timeout
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    /// Override retry count
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Keep the entry but never connect to it
    #[serde(default)]
    pub disabled: bool,
}

/// Transport configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum TransportConfig {
    /// HTTP transport (JSON or SSE responses)
    ///
    /// Matched first because it has a required `url` field that distinguishes
    /// it from Stdio. Serde tries variants top-to-bottom with `untagged`.
    Http {
        /// Server URL
        url: String,

        /// Optional HTTP headers (e.g. `Authorization`)
        #[serde(default)]
        headers: HashMap<String, String>,
    },

    /// stdio transport (launch subprocess)
    Stdio {
        /// Command to execute (e.g. `"npx"` or `"npx -y @modelcontextprotocol/server-filesystem /tmp"`)
        command: String,

        /// Optional separate arguments list
        ///
        /// If provided, `command` is treated as the program name only.
        /// If omitted, `command` is split on whitespace into program + args.
        #[serde(default)]
        args: Vec<String>,

        /// Optional environment variables to set for the child process
        #[serde(default)]
        env: HashMap<String, String>,

        /// Optional working directory
        #[serde(default)]
        cwd: Option<String>,
    },
}

/// Resolved transport with all parameters needed to start a connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportType {
    /// Launch a child process and speak JSON-RPC over its stdio
    Stdio {
        /// Program to execute
        program: String,
        /// Command-line arguments
        args: Vec<String>,
        /// Environment variables
        env: HashMap<String, String>,
        /// Working directory
        cwd: Option<String>,
    },
    /// POST JSON-RPC messages to a URL
    Http {
        /// Endpoint URL
        url: String,
        /// Extra request headers
        headers: HashMap<String, String>,
    },
}

impl TransportType {
    /// Kind of this transport
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportType::Stdio { .. } => TransportKind::Stdio,
            TransportType::Http { .. } => TransportKind::Http,
        }
    }
}

fn split_command(command: &str) -> (String, Vec<String>) {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| command.to_string());
    (program, parts.collect())
}

static DEFAULT_META: EntryMeta = EntryMeta {
    description: None,
    visibility: Visibility::Public,
    sensitivity: Sensitivity::Low,
    tags: Vec::new(),
    timeout_ms: None,
    startup_timeout_ms: None,
    max_retries: None,
    disabled: false,
};

impl ServerEntry {
    /// Detect transport type from configuration
    #[must_use]
    pub fn detect_transport(&self) -> TransportType {
        match self {
            ServerEntry::Simple(s) => {
                if s.starts_with("http://") || s.starts_with("https://") {
                    TransportType::Http {
                        url: s.clone(),
                        headers: HashMap::new(),
                    }
                } else {
                    let (program, args) = split_command(s);
                    TransportType::Stdio {
                        program,
                        args,
                        env: HashMap::new(),
                        cwd: None,
                    }
                }
            }
            ServerEntry::Advanced { transport, .. } => match transport {
                TransportConfig::Stdio {
                    command,
                    args,
                    env,
                    cwd,
                } => {
                    let (program, args) = if args.is_empty() {
                        split_command(command)
                    } else {
                        (command.clone(), args.clone())
                    };
                    TransportType::Stdio {
                        program,
                        args,
                        env: env.clone(),
                        cwd: cwd.clone(),
                    }
                }
                TransportConfig::Http { url, headers } => TransportType::Http {
                    url: url.clone(),
                    headers: headers.clone(),
                },
            },
        }
    }

    /// Metadata, with defaults for the simple form
    #[must_use]
    pub fn meta(&self) -> &EntryMeta {
        match self {
            ServerEntry::Simple(_) => &DEFAULT_META,
            ServerEntry::Advanced { meta, .. } => meta,
        }
    }

    /// Request timeout (entry override, then registry default)
    #[must_use]
    pub fn request_timeout(&self, defaults: &RegistryDefaults) -> Duration {
        let ms = self
            .meta()
            .timeout_ms
            .or(defaults.timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// Startup timeout (entry override, then registry default)
    #[must_use]
    pub fn startup_timeout(&self, defaults: &RegistryDefaults) -> Duration {
        let ms = self
            .meta()
            .startup_timeout_ms
            .or(defaults.startup_timeout_ms)
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// Whether the entry is switched off
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.meta().disabled
    }

    fn expand_env(&mut self) {
        if let ServerEntry::Advanced { transport, .. } = self {
            match transport {
                TransportConfig::Http { url, headers } => {
                    *url = expand_vars(url);
                    for value in headers.values_mut() {
                        *value = expand_vars(value);
                    }
                }
                TransportConfig::Stdio {
                    args, env, cwd, ..
                } => {
                    for arg in args.iter_mut() {
                        *arg = expand_vars(arg);
                    }
                    for value in env.values_mut() {
                        *value = expand_vars(value);
                    }
                    if let Some(dir) = cwd {
                        *dir = expand_vars(dir);
                    }
                }
            }
        }
    }
}

/// Expand `${VAR}` references from the process environment
///
/// Unset variables expand to the empty string. An unterminated `${` is kept
/// verbatim.
#[must_use]
pub fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find('}') {
            let name = &after[..end];
            match std::env::var(name) {
                Ok(value) => out.push_str(&value),
                Err(_) => warn!("Environment variable '{}' is not set, expanding to empty", name),
            }
            rest = &after[end + 1..];
        } else {
            out.push_str(&rest[start..]);
            rest = "";
        }
    }
    out.push_str(rest);
    out
}

fn valid_server_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl MCPRegistry {
    /// Parse a registry document, validate ids and expand `${VAR}` references
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or an id is invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let mut registry: Self = serde_json::from_str(json)
            .map_err(|e| MCPError::Config(format!("Invalid registry: {e}")))?;

        if let Some(bad) = registry.servers.keys().find(|id| !valid_server_id(id)) {
            return Err(MCPError::Config(format!(
                "Invalid server id '{bad}': use letters, digits, '-' or '_'"
            )));
        }

        for entry in registry.servers.values_mut() {
            entry.expand_env();
        }

        debug!("Registry parsed with {} server(s)", registry.servers.len());
        Ok(registry)
    }

    /// Load a registry file from disk
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable or invalid
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MCPError::Config(format!(
                "Registry file not found: {}",
                path.display()
            )));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Look up an enabled entry
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ServerEntry> {
        self.servers.get(id).filter(|e| !e.is_disabled())
    }

    /// Iterate enabled entries in id order
    pub fn enabled(&self) -> impl Iterator<Item = (&String, &ServerEntry)> {
        self.servers.iter().filter(|(_, e)| !e.is_disabled())
    }
}
