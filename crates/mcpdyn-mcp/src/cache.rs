//! Tool discovery cache with a time-to-live

use chrono::{DateTime, Utc};
use mcpdyn_types::ToolDescriptor;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How long discovered tools stay fresh by default
pub const DEFAULT_TOOL_CACHE_TTL: Duration = Duration::from_secs(300);

/// Tools discovered from one server
#[derive(Debug, Clone)]
pub struct CachedTools {
    /// Discovered tools
    pub tools: Vec<ToolDescriptor>,
    /// Wall-clock time of discovery
    pub fetched_at: DateTime<Utc>,
    /// Protocol version of the connection the tools came from
    pub protocol_version: Option<String>,
    stored: Instant,
}

impl CachedTools {
    /// Find a tool by name
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Per-server tool cache
pub struct ToolCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedTools>>,
}

impl ToolCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh entry for a server, if any
    pub async fn get(&self, server: &str) -> Option<CachedTools> {
        self.entries
            .read()
            .await
            .get(server)
            .filter(|c| c.stored.elapsed() < self.ttl)
            .cloned()
    }

    /// Store (or replace) a server's tools
    pub async fn insert(
        &self,
        server: &str,
        tools: Vec<ToolDescriptor>,
        protocol_version: Option<String>,
    ) -> CachedTools {
        let cached = CachedTools {
            tools,
            fetched_at: Utc::now(),
            protocol_version,
            stored: Instant::now(),
        };
        self.entries
            .write()
            .await
            .insert(server.to_string(), cached.clone());
        cached
    }

    /// Drop one server's entry
    pub async fn invalidate(&self, server: &str) {
        self.entries.write().await.remove(server);
    }

    /// Drop everything
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_CACHE_TTL)
    }
}
