//! agentloop - tool-augmented conversational agent
//!
#![doc = "Main entry point for the agentloop CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentloop::cli::{Cli, Commands};
use agentloop::commands;
use agentloop::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat => {
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Run { prompt } => {
            tracing::debug!("Using prompt: {}", prompt);
            commands::run::run_task(config, prompt).await?;
            Ok(())
        }
        Commands::Tools { json } => {
            commands::tools::list_tools(&config, json)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so the transcript on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "agentloop=debug"
    } else {
        "agentloop=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
