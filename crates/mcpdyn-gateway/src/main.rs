mod cli;
mod config;
mod service;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Config;
use service::GatewayService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config_dir)?;

    let gateway = GatewayService::new(config, cli.registry);
    gateway.run(cli.command).await
}
