use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::debug;

use washdash_config::{init_logging, AssistantConfig};
use washdash_core::ThreadController;
use washdash_gateway::HttpChatGateway;

mod cli;
mod commands;
mod repl;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AssistantConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_logging(&config.logging);
    debug!(
        gateway = %config.gateway.normalized_base_url(),
        streaming = config.gateway.prefer_streaming,
        "Configuration loaded"
    );

    let gateway = HttpChatGateway::from_config(&config.gateway)?;
    let controller = Arc::new(ThreadController::from_config(Arc::new(gateway), &config));

    match cli.command.unwrap_or(Commands::Chat { thread: None }) {
        Commands::Chat { thread } => repl::run(&controller, thread.as_deref()).await?,
        Commands::Ask { message, thread } => {
            commands::ask(&controller, &message, thread.as_deref()).await?
        }
        Commands::Threads => commands::list_threads(&controller).await?,
        Commands::Delete { thread_id } => commands::delete(&controller, &thread_id).await?,
    }

    Ok(())
}
