//! Transports that carry JSON-RPC messages to an MCP server

use crate::config::TransportType;
use crate::error::{MCPError, Result};
#[cfg(feature = "http")]
use crate::http_client::HttpTransport;
use crate::jsonrpc::RpcConnection;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// A connected transport
pub enum Transport {
    /// Newline-delimited JSON-RPC over a stream pair (child process or in-process)
    Stdio(StdioTransport),
    /// JSON-RPC over HTTP POST
    #[cfg(feature = "http")]
    Http(HttpTransport),
}

impl Transport {
    /// Open a transport for a resolved registry entry
    ///
    /// # Errors
    /// Returns `StartupFailed` if the process cannot be spawned, or `Config`
    /// if the HTTP settings are invalid
    pub async fn open(server: &str, transport: &TransportType) -> Result<Self> {
        match transport {
            TransportType::Stdio {
                program,
                args,
                env,
                cwd,
            } => Ok(Transport::Stdio(StdioTransport::spawn(
                server,
                program,
                args,
                env,
                cwd.as_deref(),
            )?)),
            #[cfg(feature = "http")]
            TransportType::Http { url, headers } => {
                Ok(Transport::Http(HttpTransport::new(server, url, headers)?))
            }
            #[cfg(not(feature = "http"))]
            TransportType::Http { url, .. } => Err(MCPError::Config(format!(
                "Server '{server}' uses HTTP ({url}) but the http feature is disabled"
            ))),
        }
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    /// Propagates timeout, disconnect, transport and RPC errors
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        match self {
            Transport::Stdio(t) => t.conn.request(method, params, timeout).await,
            #[cfg(feature = "http")]
            Transport::Http(t) => t.request(method, params, timeout).await,
        }
    }

    /// Send a notification
    ///
    /// # Errors
    /// Propagates write and transport errors
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        match self {
            Transport::Stdio(t) => t.conn.notify(method, params).await,
            #[cfg(feature = "http")]
            Transport::Http(t) => t.notify(method, params).await,
        }
    }

    /// Whether the transport can still carry requests
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Transport::Stdio(t) => !t.conn.is_closed(),
            #[cfg(feature = "http")]
            Transport::Http(_) => true,
        }
    }
}

/// JSON-RPC over a child process's stdin/stdout
pub struct StdioTransport {
    conn: RpcConnection,
    /// Held so the child is killed when the transport drops
    _child: Option<Mutex<Child>>,
}

impl StdioTransport {
    /// Spawn the server process and attach to its pipes
    ///
    /// # Errors
    /// Returns `StartupFailed` if the process cannot be spawned
    pub fn spawn(
        server: &str,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&str>,
    ) -> Result<Self> {
        debug!(
            "Spawning stdio server '{}': {} {:?} (env keys: {:?})",
            server,
            program,
            args,
            env.keys()
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let startup_failed = |reason: String| MCPError::StartupFailed {
            server: server.into(),
            reason,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| startup_failed(format!("Failed to spawn '{program}': {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| startup_failed("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| startup_failed("stdout not captured".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        Ok(Self {
            conn: RpcConnection::new(server, stdout, stdin),
            _child: Some(Mutex::new(child)),
        })
    }

    /// Attach to an in-process server over an arbitrary stream pair
    pub fn from_streams<R, W>(server: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            conn: RpcConnection::new(server, reader, writer),
            _child: None,
        }
    }
}
