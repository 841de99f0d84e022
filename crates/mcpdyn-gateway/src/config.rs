use anyhow::{anyhow, Context};
use mcpdyn_mcp::{OrchestratorOptions, SandboxLimits};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[registry]
path = "~/.mcpdyn/mcp-registry.json"  # Or set MCP_REGISTRY_PATH

[orchestrator]
startup_timeout_secs = 10
request_timeout_secs = 30
tool_cache_ttl_secs = 300
max_retries = 1

[sandbox]
max_steps = 64
timeout_secs = 60

[skills]
# ~/.mcpdyn/skills and ./.mcpdyn/skills are always scanned
directories = []
# Marketplace checkouts: <root>/skills and <root>/plugins/*/skills
marketplaces = []

[logging]
level = "info"  # trace, debug, info, warn, error. Or set MCPDYN_LOG
json = false
"#;

const CONFIG_FILE: &str = "mcpdyn.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub tool_cache_ttl_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    pub max_steps: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SkillsConfig {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub marketplaces: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub registry: RegistryConfig,
    pub orchestrator: OrchestratorConfig,
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config directory: ~/.mcpdyn
    fn default_config_dir() -> anyhow::Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".mcpdyn"))
            .ok_or_else(|| anyhow!("Could not find home directory"))
    }

    /// Ensure the config directory and file exist, creating defaults if needed
    fn ensure_config(dir: &Path) -> anyhow::Result<PathBuf> {
        let config_path = dir.join(CONFIG_FILE);

        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            eprintln!("Created config directory: {}", dir.display());
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            eprintln!("Created default config: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Load configuration with layered approach:
    /// 1. `<config_dir>/mcpdyn.toml`, default ~/.mcpdyn (auto-created if missing)
    /// 2. Local override: ./mcpdyn.toml (optional)
    /// 3. Environment variables with `MCPDYN__` prefix
    /// 4. `MCP_REGISTRY_PATH` and `MCPDYN_LOG`
    pub fn load(config_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config_dir = match config_dir {
            Some(dir) => dir,
            None => Self::default_config_dir()?,
        };
        let config_path = Self::ensure_config(&config_dir)?;

        let mut builder = config::Config::builder()
            .add_source(config::File::from(config_path))
            .add_source(config::File::with_name("mcpdyn").required(false))
            .add_source(config::Environment::with_prefix("MCPDYN").separator("__"));

        if let Ok(path) = env::var("MCP_REGISTRY_PATH") {
            builder = builder.set_override("registry.path", path)?;
        }
        if let Ok(level) = env::var("MCPDYN_LOG") {
            builder = builder.set_override("logging.level", level)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Registry file with `~` expanded
    pub fn registry_path(&self) -> PathBuf {
        expand_home(&self.registry.path)
    }

    /// Orchestrator settings
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            request_timeout: Duration::from_secs(self.orchestrator.request_timeout_secs),
            startup_timeout: Duration::from_secs(self.orchestrator.startup_timeout_secs),
            max_retries: self.orchestrator.max_retries,
            tool_cache_ttl: Duration::from_secs(self.orchestrator.tool_cache_ttl_secs),
            sandbox: SandboxLimits {
                max_steps: self.sandbox.max_steps,
                timeout: Duration::from_secs(self.sandbox.timeout_secs),
            },
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(path),
    }
}
