//! Streamforge - streaming chat relay
//!
#![doc = "Main entry point for the streamforge server and history CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamforge::cli::{Cli, Commands};
use streamforge::commands;
use streamforge::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting server on {}", config.server.bind);
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::debug!("Starting history command");
            commands::history::handle_history(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over `--verbose`. JSON output is one object per line.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "streamforge=debug,tower_http=debug"
    } else {
        "streamforge=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
