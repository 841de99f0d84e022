//! Orchestrator over every server in the registry
//!
//! Clients are started lazily on first use and kept in a pool. A dead client
//! is evicted and restarted; retryable failures get `max_retries` extra
//! attempts on a fresh connection.

use crate::cache::{CachedTools, ToolCache, DEFAULT_TOOL_CACHE_TTL};
use crate::client::{normalize_arguments, MCPClient};
use crate::config::{MCPRegistry, ServerEntry, TransportType};
use crate::error::{MCPError, Result};
use crate::policy::{ExecutionPolicy, DEFAULT_MAX_RETRIES};
use crate::sandbox::{ExecutionReport, ModuleMap, Sandbox, SandboxLimits, ToolInvoker};
use crate::transport::Transport;
use futures::future::{join_all, BoxFuture};
use mcpdyn_types::{ServerCapability, ServerDescription};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Opens a transport for a server; swapped out in tests
pub type Connector =
    Arc<dyn Fn(String, TransportType) -> BoxFuture<'static, Result<Transport>> + Send + Sync>;

/// Settings that apply where the registry is silent
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Per-request timeout for servers without `timeoutMs`
    pub request_timeout: Duration,
    /// Spawn plus handshake deadline for servers without `startupTimeoutMs`
    pub startup_timeout: Duration,
    /// Extra attempts after a retryable failure
    pub max_retries: u32,
    /// How long discovered tool lists stay fresh
    pub tool_cache_ttl: Duration,
    /// Limits for generated programs
    pub sandbox: SandboxLimits,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(crate::config::DEFAULT_REQUEST_TIMEOUT_MS),
            startup_timeout: Duration::from_millis(crate::config::DEFAULT_STARTUP_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            tool_cache_ttl: DEFAULT_TOOL_CACHE_TTL,
            sandbox: SandboxLimits::default(),
        }
    }
}

/// Per-call options for [`MCPOrchestrator::call_tool`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Caller confirmed a high-sensitivity call
    pub confirm: bool,
}

/// Routes discovery and tool calls to registry servers
pub struct MCPOrchestrator {
    registry: MCPRegistry,
    policies: BTreeMap<String, ExecutionPolicy>,
    clients: RwLock<HashMap<String, Arc<MCPClient>>>,
    /// One gate per server so concurrent callers share a single startup
    connecting: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cache: ToolCache,
    sandbox: Sandbox,
    connector: Connector,
}

fn default_connector() -> Connector {
    Arc::new(
        |server: String, transport: TransportType| -> BoxFuture<'static, Result<Transport>> {
            Box::pin(async move { Transport::open(&server, &transport).await })
        },
    )
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl MCPOrchestrator {
    /// Create an orchestrator that spawns and connects real servers
    #[must_use]
    pub fn new(registry: MCPRegistry, options: OrchestratorOptions) -> Self {
        Self::with_connector(registry, options, default_connector())
    }

    /// Create an orchestrator with a custom transport factory
    #[must_use]
    pub fn with_connector(
        mut registry: MCPRegistry,
        options: OrchestratorOptions,
        connector: Connector,
    ) -> Self {
        let defaults = &mut registry.defaults;
        defaults
            .timeout_ms
            .get_or_insert(millis(options.request_timeout));
        defaults
            .startup_timeout_ms
            .get_or_insert(millis(options.startup_timeout));
        defaults.max_retries.get_or_insert(options.max_retries);

        let policies = registry
            .enabled()
            .map(|(id, entry)| (id.clone(), ExecutionPolicy::derive(entry, &registry.defaults)))
            .collect();
        let sandbox = Sandbox::new(ModuleMap::from_registry(&registry), options.sandbox);

        info!(
            "Orchestrator ready with {} enabled server(s)",
            registry.enabled().count()
        );

        Self {
            registry,
            policies,
            clients: RwLock::new(HashMap::new()),
            connecting: Mutex::new(HashMap::new()),
            cache: ToolCache::new(options.tool_cache_ttl),
            sandbox,
            connector,
        }
    }

    /// The loaded registry (with defaults filled in)
    #[must_use]
    pub fn registry(&self) -> &MCPRegistry {
        &self.registry
    }

    /// Policy for an enabled server
    #[must_use]
    pub fn policy(&self, server: &str) -> Option<&ExecutionPolicy> {
        self.policies.get(server)
    }

    /// Modules available to generated code
    #[must_use]
    pub fn modules(&self) -> &ModuleMap {
        self.sandbox.modules()
    }

    /// Servers with a live pooled client
    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.is_alive())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn enabled_entry(&self, server: &str) -> Result<(&ServerEntry, &ExecutionPolicy)> {
        match (self.registry.get(server), self.policies.get(server)) {
            (Some(entry), Some(policy)) => Ok((entry, policy)),
            _ => Err(MCPError::ServerNotFound(server.into())),
        }
    }

    /// Hidden servers behave as if they did not exist
    fn visible_entry(&self, server: &str) -> Result<(&ServerEntry, &ExecutionPolicy)> {
        let (entry, policy) = self.enabled_entry(server)?;
        if policy.listed {
            Ok((entry, policy))
        } else {
            Err(MCPError::ServerNotFound(server.into()))
        }
    }

    /// List every visible server, optionally with its tools
    ///
    /// Discovery failures are reported per server, never for the whole list.
    pub async fn list_capabilities(&self, include_tools: bool) -> Vec<ServerCapability> {
        let visible: Vec<_> = self
            .registry
            .enabled()
            .filter_map(|(id, entry)| {
                let policy = self.policies.get(id)?;
                policy.listed.then_some((id.as_str(), entry, policy))
            })
            .collect();

        if !include_tools {
            return visible
                .into_iter()
                .map(|(id, entry, policy)| capability(id, entry, policy))
                .collect();
        }

        join_all(visible.into_iter().map(|(id, entry, policy)| async move {
            let mut cap = capability(id, entry, policy);
            match self.tools(id, entry, policy, false).await {
                Ok((cached, _)) => cap.tools = Some(cached.tools),
                Err(e) => {
                    error!("Tool discovery for '{}' failed: {}", id, e);
                    cap.error = Some(e.to_string());
                }
            }
            cap
        }))
        .await
    }

    /// Describe one visible server and its tools
    ///
    /// # Errors
    /// `ServerNotFound` for unknown, disabled or hidden servers, otherwise
    /// the discovery error
    pub async fn describe(&self, server: &str, refresh: bool) -> Result<ServerDescription> {
        let (entry, policy) = self.visible_entry(server)?;
        let (cached, from_cache) = self.tools(server, entry, policy, refresh).await?;
        Ok(ServerDescription {
            server: capability(server, entry, policy),
            tools: cached.tools,
            fetched_at: cached.fetched_at,
            cached: from_cache,
            protocol_version: cached.protocol_version,
        })
    }

    /// Call a tool on a public server
    ///
    /// # Errors
    /// `ServerNotFound`, `PolicyDenied`, `ConfirmationRequired`,
    /// `ToolNotFound`, `InvalidArguments` or the call error
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
        options: CallOptions,
    ) -> Result<Value> {
        let (entry, policy) = self.visible_entry(server)?;
        policy.check_direct_call(server, tool, options.confirm)?;
        self.dispatch(server, entry, policy, tool, args).await
    }

    /// Run a generated program in the sandbox
    ///
    /// # Errors
    /// See [`Sandbox::execute`]
    pub async fn execute_code(&self, code: &str, input: Value) -> Result<ExecutionReport> {
        self.sandbox.execute(self, code, input).await
    }

    /// Close every pooled connection and forget cached tools
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.clients.write().await.drain().collect();
        for (name, _) in &drained {
            debug!("Closing MCP server '{}'", name);
        }
        self.cache.clear().await;
        info!("Orchestrator shut down ({} connection(s) closed)", drained.len());
    }

    async fn dispatch(
        &self,
        server: &str,
        entry: &ServerEntry,
        policy: &ExecutionPolicy,
        tool: &str,
        args: Value,
    ) -> Result<Value> {
        let args = normalize_arguments(args);
        let (mut cached, from_cache) = self.tools(server, entry, policy, false).await?;
        if cached.tool(tool).is_none() && from_cache {
            debug!("Tool '{}' not in cached list for '{}', refreshing", tool, server);
            cached = self.tools(server, entry, policy, true).await?.0;
        }
        let descriptor = cached.tool(tool).ok_or_else(|| MCPError::ToolNotFound {
            server: server.into(),
            tool: tool.into(),
        })?;

        let missing: Vec<String> = descriptor
            .required_args()
            .into_iter()
            .filter(|key| args.get(key).is_none())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(MCPError::InvalidArguments {
                tool: tool.into(),
                missing,
            });
        }

        if policy.audited() {
            let arg_keys: Vec<&String> = args
                .as_object()
                .map(|o| o.keys().collect())
                .unwrap_or_default();
            info!(
                target: "mcpdyn::audit",
                server,
                tool,
                sensitivity = %policy.sensitivity,
                ?arg_keys,
                "Tool call"
            );
        }

        let timeout = policy.timeout;
        self.with_retry(server, entry, policy, |client| {
            let args = args.clone();
            async move { client.call_tool(tool, args, timeout).await }
        })
        .await
    }

    /// Tools for a server, from the cache unless `refresh`
    ///
    /// The flag is true when the list came from the cache.
    async fn tools(
        &self,
        server: &str,
        entry: &ServerEntry,
        policy: &ExecutionPolicy,
        refresh: bool,
    ) -> Result<(CachedTools, bool)> {
        if !refresh {
            if let Some(cached) = self.cache.get(server).await {
                return Ok((cached, true));
            }
        }

        let timeout = policy.timeout;
        let (tools, protocol_version) = self
            .with_retry(server, entry, policy, |client| async move {
                let tools = client.list_tools(timeout).await?;
                Ok((tools, client.protocol_version.clone()))
            })
            .await?;
        Ok((
            self.cache
                .insert(server, tools, Some(protocol_version))
                .await,
            false,
        ))
    }

    async fn with_retry<T, F, Fut>(
        &self,
        server: &str,
        entry: &ServerEntry,
        policy: &ExecutionPolicy,
        op: F,
    ) -> Result<T>
    where
        F: Fn(Arc<MCPClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match self.client(server, entry).await {
                Ok(client) => op(client).await,
                Err(e) => Err(e),
            };
            match outcome {
                Err(e) if e.is_retryable() => {
                    self.evict(server).await;
                    if attempt >= policy.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "Retrying '{}' after error (attempt {}/{}): {}",
                        server, attempt, policy.max_retries, e
                    );
                }
                other => return other,
            }
        }
    }

    async fn client(&self, server: &str, entry: &ServerEntry) -> Result<Arc<MCPClient>> {
        if let Some(client) = self.live_client(server).await {
            return Ok(client);
        }

        let gate = Arc::clone(
            self.connecting
                .lock()
                .await
                .entry(server.to_string())
                .or_default(),
        );
        let _guard = gate.lock().await;

        // Another caller may have connected while we waited
        if let Some(client) = self.live_client(server).await {
            return Ok(client);
        }

        let startup_timeout = entry.startup_timeout(&self.registry.defaults);
        let transport = entry.detect_transport();
        info!(
            "Starting MCP server '{}' ({:?}) with timeout {:?}",
            server,
            transport.kind(),
            startup_timeout
        );

        let connector = Arc::clone(&self.connector);
        let client = tokio::time::timeout(startup_timeout, async {
            let transport = connector(server.to_string(), transport).await?;
            MCPClient::handshake(server, transport, startup_timeout).await
        })
        .await
        .map_err(|_| MCPError::StartupTimeout {
            server: server.into(),
            timeout: startup_timeout,
        })??;

        let client = Arc::new(client);
        self.clients
            .write()
            .await
            .insert(server.to_string(), Arc::clone(&client));
        Ok(client)
    }

    async fn live_client(&self, server: &str) -> Option<Arc<MCPClient>> {
        let clients = self.clients.read().await;
        clients
            .get(server)
            .filter(|c| c.is_alive())
            .map(Arc::clone)
    }

    async fn evict(&self, server: &str) {
        if self.clients.write().await.remove(server).is_some() {
            debug!("Evicted client for '{}'", server);
        }
    }
}

impl ToolInvoker for MCPOrchestrator {
    fn invoke<'a>(
        &'a self,
        server: &'a str,
        tool: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let (entry, policy) = self.enabled_entry(server)?;
            policy.check_code_access(server)?;
            self.dispatch(server, entry, policy, tool, args).await
        })
    }
}

fn capability(id: &str, entry: &ServerEntry, policy: &ExecutionPolicy) -> ServerCapability {
    let meta = entry.meta();
    ServerCapability {
        id: id.to_string(),
        description: meta.description.clone(),
        transport: entry.detect_transport().kind(),
        visibility: meta.visibility,
        sensitivity: meta.sensitivity,
        tags: meta.tags.clone(),
        policy: policy.flags(id),
        tools: None,
        error: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::MockServer;
    use serde_json::json;

    const REGISTRY: &str = r#"{
        "servers": {
            "files": "files-server",
            "internal": {"command": "internal-server", "visibility": "internal"},
            "secret": {"command": "db-server", "sensitivity": "high", "description": "Production DB"},
            "shadow": {"command": "shadow-server", "visibility": "hidden"},
            "old": {"command": "old-server", "disabled": true}
        }
    }"#;

    fn mock() -> MockServer {
        MockServer::new()
            .tool("echo", &[])
            .tool("read", &["path"])
            .tool("slow", &[])
    }

    fn orchestrator_with(registry: &str, mock: &MockServer) -> MCPOrchestrator {
        MCPOrchestrator::with_connector(
            MCPRegistry::from_json(registry).unwrap(),
            OrchestratorOptions::default(),
            mock.connector(),
        )
    }

    #[tokio::test]
    async fn test_list_capabilities_is_lazy_and_filtered() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);
        let caps = orch.list_capabilities(false).await;
        let ids: Vec<_> = caps.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["files", "internal", "secret"]);
        assert_eq!(mock.connections(), 0);

        let secret = &caps[2];
        assert!(secret.policy.requires_confirmation);
        assert!(!secret.policy.code_access);
        assert_eq!(secret.description.as_deref(), Some("Production DB"));
        assert!(secret.tools.is_none());
    }

    #[tokio::test]
    async fn test_list_capabilities_with_tools() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);
        let caps = orch.list_capabilities(true).await;
        for cap in &caps {
            assert_eq!(cap.tools.as_ref().unwrap().len(), 3, "{}", cap.id);
            assert!(cap.error.is_none());
        }
        assert_eq!(mock.connections(), 3);
    }

    #[tokio::test]
    async fn test_discovery_errors_reported_per_server() {
        let mock = mock();
        let inner = mock.connector();
        let connector: Connector = Arc::new(
            move |server: String, transport: TransportType| -> BoxFuture<'static, Result<Transport>> {
                if server == "internal" {
                    Box::pin(async move {
                        Err(MCPError::StartupFailed {
                            server,
                            reason: "no such binary".into(),
                        })
                    })
                } else {
                    inner(server, transport)
                }
            },
        );
        let orch = MCPOrchestrator::with_connector(
            MCPRegistry::from_json(REGISTRY).unwrap(),
            OrchestratorOptions {
                max_retries: 0,
                ..OrchestratorOptions::default()
            },
            connector,
        );

        let caps = orch.list_capabilities(true).await;
        let internal = caps.iter().find(|c| c.id == "internal").unwrap();
        assert!(internal.tools.is_none());
        assert!(internal.error.as_ref().unwrap().contains("no such binary"));
        let files = caps.iter().find(|c| c.id == "files").unwrap();
        assert!(files.tools.is_some());
    }

    #[tokio::test]
    async fn test_describe_uses_cache() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);

        let first = orch.describe("files", false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.protocol_version.as_deref(), Some("2024-11-05"));
        assert!(first.tool("read").is_some());

        let second = orch.describe("files", false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.fetched_at, first.fetched_at);

        let refreshed = orch.describe("files", true).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(mock.connections(), 1);
        assert_eq!(orch.connected_servers().await, vec!["files"]);
    }

    #[tokio::test]
    async fn test_hidden_and_disabled_servers_unknown() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);
        for id in ["shadow", "old", "nope"] {
            assert!(matches!(
                orch.describe(id, false).await,
                Err(MCPError::ServerNotFound(_))
            ));
            assert!(matches!(
                orch.call_tool(id, "echo", json!({}), CallOptions::default()).await,
                Err(MCPError::ServerNotFound(_))
            ));
        }
        assert_eq!(mock.connections(), 0);
    }

    #[tokio::test]
    async fn test_call_tool_policy() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);

        let out = orch
            .call_tool("files", "echo", json!({"x": 1}), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"tool": "echo", "arguments": {"x": 1}}));

        assert!(matches!(
            orch.call_tool("internal", "echo", json!({}), CallOptions::default()).await,
            Err(MCPError::PolicyDenied { .. })
        ));
        assert!(matches!(
            orch.call_tool("secret", "echo", json!({}), CallOptions::default()).await,
            Err(MCPError::ConfirmationRequired { .. })
        ));
        orch.call_tool("secret", "echo", json!({}), CallOptions { confirm: true })
            .await
            .unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_args() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);

        let err = orch
            .call_tool("files", "write", json!({}), CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::ToolNotFound { .. }));

        let err = orch
            .call_tool("files", "read", json!({"mode": "r"}), CallOptions::default())
            .await
            .unwrap_err();
        match err {
            MCPError::InvalidArguments { missing, .. } => assert_eq!(missing, vec!["path"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropped_connection_retried_on_fresh_client() {
        let mock = mock().drop_first_calls(1);
        let orch = orchestrator_with(REGISTRY, &mock);
        let out = orch
            .call_tool("files", "echo", json!({}), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(out["tool"], "echo");
        assert_eq!(mock.connections(), 2);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let mock = mock().drop_first_calls(2);
        let orch = orchestrator_with(REGISTRY, &mock);
        let err = orch
            .call_tool("files", "echo", json!({}), CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::ServerDisconnected { .. }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout_from_registry() {
        let mock = mock();
        let orch = orchestrator_with(
            r#"{"defaults": {"maxRetries": 0},
                "servers": {"files": {"command": "files-server", "timeoutMs": 100}}}"#,
            &mock,
        );
        let err = orch
            .call_tool("files", "slow", json!({}), CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::RequestTimeout { .. }));
        assert!(orch.connected_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_code_uses_code_access() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);
        assert_eq!(
            orch.modules().specifiers(),
            vec!["mcp/files", "mcp/internal", "mcp/shadow"]
        );

        let code = r#"
imports: { int: mcp/internal, sh: mcp/shadow }
steps:
  - name: a
    call: int.echo
    args: { n: "$input.n" }
  - call: sh.read
    args: { path: "$a.arguments.n" }
"#;
        let report = orch.execute_code(code, json!({"n": "x"})).await.unwrap();
        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.result["arguments"], json!({"path": "x"}));

        let err = orch
            .execute_code("imports: { db: mcp/secret }\nsteps: []", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::ModuleNotFound { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_drops_pool() {
        let mock = mock();
        let orch = orchestrator_with(REGISTRY, &mock);
        orch.call_tool("files", "echo", json!({}), CallOptions::default())
            .await
            .unwrap();
        orch.shutdown().await;
        assert!(orch.connected_servers().await.is_empty());
        orch.call_tool("files", "echo", json!({}), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(mock.connections(), 2);
    }

    #[tokio::test]
    async fn test_scalar_args_checked_after_wrapping() {
        let mock = MockServer::new().tool("takes_input", &["input"]);
        let orch = orchestrator_with(REGISTRY, &mock);
        let out = orch
            .call_tool("files", "takes_input", json!(5), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(out["arguments"], json!({"input": 5}));

        let err = orch
            .call_tool("files", "takes_input", Value::Null, CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::InvalidArguments { .. }), "{err}");
        assert_eq!(mock.calls(), 1);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_audit_logs_keys_not_values() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("mcpdyn::audit=info"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mock = mock();
        let orch = orchestrator_with(
            r#"{"servers": {
                "files": "files-server",
                "vault": {"command": "vault-server", "sensitivity": "medium"}
            }}"#,
            &mock,
        );
        for server in ["vault", "files"] {
            orch.call_tool(server, "echo", json!({"token": "s3cret"}), CallOptions::default())
                .await
                .unwrap();
        }

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 1, "{output}");
        assert!(lines[0].contains("mcpdyn::audit"));
        assert!(lines[0].contains("vault"));
        assert!(lines[0].contains("token"));
        assert!(!output.contains("s3cret"));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        use crate::testing::{http_response, HttpFixture};

        let unauthorized = http_response("401 Unauthorized", &[("www-authenticate", "Bearer")], "");
        let fixture = HttpFixture::start(vec![unauthorized.clone(), unauthorized]).await;
        let registry = format!(r#"{{"servers": {{"remote": "{}"}}}}"#, fixture.url);
        let orch = MCPOrchestrator::new(
            MCPRegistry::from_json(&registry).unwrap(),
            OrchestratorOptions::default(),
        );

        let err = orch.describe("remote", false).await.unwrap_err();
        assert!(matches!(err, MCPError::AuthRequired { .. }), "{err}");
        assert_eq!(fixture.requests().len(), 1);
    }
}
