use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mcpdyn", about = "Dynamic orchestrator for MCP servers", version)]
pub struct Cli {
    /// Directory holding mcpdyn.toml [default: ~/.mcpdyn]
    #[arg(long, env = "MCPDYN_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Registry file, overrides the configured path
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List visible servers and their policy
    List {
        /// Also discover each server's tools
        #[arg(long)]
        tools: bool,
    },

    /// Describe one server and its tools
    Describe {
        /// Server id
        server: String,
        /// Bypass the tool cache
        #[arg(long)]
        refresh: bool,
    },

    /// Call a tool on a public server
    Call {
        /// Server id
        server: String,
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Confirm a high-sensitivity call
        #[arg(long)]
        confirm: bool,
    },

    /// Run a JSON or YAML program in the sandbox
    Exec {
        /// Program file, or `-` for stdin
        file: String,
        /// Program input as JSON
        #[arg(long)]
        input: Option<String>,
    },

    /// Browse the skills catalog
    Skills {
        /// Rank skills matching a query
        #[arg(long)]
        search: Option<String>,
        /// Print one skill's full document
        #[arg(long, conflicts_with = "search")]
        show: Option<String>,
    },

    /// Serve the orchestrator as an MCP server on stdio
    Serve,
}
