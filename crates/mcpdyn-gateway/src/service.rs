use crate::cli::Command;
use crate::config::{expand_home, Config};
use anyhow::{anyhow, bail, Context, Result};
use mcpdyn_mcp::{CallOptions, MCPOrchestrator, MCPRegistry, OrchestratorServer};
use mcpdyn_skills::SkillsRegistry;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{error, info, warn};

/// Runs one CLI command against the configured registry
pub struct GatewayService {
    config: Config,
    registry_override: Option<PathBuf>,
}

impl GatewayService {
    /// Create a service; `registry_override` replaces the configured registry path
    pub fn new(config: Config, registry_override: Option<PathBuf>) -> Self {
        Self {
            config,
            registry_override,
        }
    }

    /// Initialize logging, run `command` and close every server connection
    ///
    /// # Errors
    /// Fails when the registry cannot be loaded or the command fails
    pub async fn run(self, command: Command) -> Result<()> {
        mcpdyn_logging::init_logging(&self.config.logging.level, self.config.logging.json)?;

        if let Command::Skills { search, show } = &command {
            return self.skills(search.as_deref(), show.as_deref());
        }

        let orchestrator = Arc::new(self.orchestrator()?);
        let result = self.dispatch(&orchestrator, command).await;
        orchestrator.shutdown().await;
        result
    }

    fn orchestrator(&self) -> Result<MCPOrchestrator> {
        let path = self
            .registry_override
            .clone()
            .unwrap_or_else(|| self.config.registry_path());
        let registry = MCPRegistry::load(&path)
            .with_context(|| format!("Failed to load registry {}", path.display()))?;
        info!(
            "Loaded registry {} ({} server(s))",
            path.display(),
            registry.servers.len()
        );
        Ok(MCPOrchestrator::new(
            registry,
            self.config.orchestrator_options(),
        ))
    }

    async fn dispatch(&self, orchestrator: &Arc<MCPOrchestrator>, command: Command) -> Result<()> {
        match command {
            Command::List { tools } => print_json(&orchestrator.list_capabilities(tools).await),
            Command::Describe { server, refresh } => {
                print_json(&orchestrator.describe(&server, refresh).await?)
            }
            Command::Call {
                server,
                tool,
                args,
                confirm,
            } => {
                let args: Value =
                    serde_json::from_str(&args).context("--args must be valid JSON")?;
                let output = orchestrator
                    .call_tool(&server, &tool, args, CallOptions { confirm })
                    .await?;
                print_json(&output)
            }
            Command::Exec { file, input } => {
                let code = read_program(&file).await?;
                let input = match input {
                    Some(raw) => serde_json::from_str(&raw).context("--input must be valid JSON")?,
                    None => Value::Null,
                };
                let report = orchestrator.execute_code(&code, input).await?;
                print_json(&report)?;
                if report.success {
                    Ok(())
                } else {
                    bail!(
                        "program failed: {}",
                        report.error.unwrap_or_else(|| "unknown error".into())
                    )
                }
            }
            Command::Serve => self.serve(Arc::clone(orchestrator)).await,
            Command::Skills { .. } => Err(anyhow!("skills command handled without a registry")),
        }
    }

    async fn serve(&self, orchestrator: Arc<MCPOrchestrator>) -> Result<()> {
        info!("Starting mcpdyn MCP server");
        let server = OrchestratorServer::new(orchestrator);

        let shutdown = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
            info!("Received shutdown signal");
        };

        tokio::select! {
            result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            () = shutdown => {
                info!("Shutting down gracefully...");
            }
        }

        info!("mcpdyn server stopped");
        Ok(())
    }

    fn skills(&self, search: Option<&str>, show: Option<&str>) -> Result<()> {
        let mut registry = SkillsRegistry::new()
            .with_personal_skills()
            .with_project_skills();
        for dir in &self.config.skills.directories {
            registry = registry.add_directory(expand_home(dir));
        }
        for root in &self.config.skills.marketplaces {
            registry = registry.add_marketplace(expand_home(root));
        }

        if let Err(e) = registry.discover() {
            warn!("Failed to discover skills: {:#}", e);
        }

        if let Some(name) = show {
            let skill = registry.load_skill(name)?;
            println!("{}", skill.content.as_deref().unwrap_or_default());
        } else if let Some(query) = search {
            let hits = registry.search(query);
            if hits.is_empty() {
                println!("No skills match '{query}'");
            }
            for skill in hits {
                println!("{}", skill.to_summary());
            }
        } else {
            println!("{}", registry.render_catalog());
        }
        Ok(())
    }
}

async fn read_program(file: &str) -> Result<String> {
    if file == "-" {
        let mut code = String::new();
        tokio::io::stdin()
            .read_to_string(&mut code)
            .await
            .context("Failed to read program from stdin")?;
        Ok(code)
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read program {file}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
