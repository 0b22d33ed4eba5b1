use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use claude_trader::logging::init_tracing;
use claude_trader::store::StrategyKey;
use claude_trader::{build_registry, build_state, load_config, server, validate_strategy_file};

#[derive(Parser, Debug)]
#[command(
    name = "claude-trader",
    version,
    about = "Define trading strategies and analyse them with Claude CLI analysts"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/claude-trader.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST API
    Serve,
    /// Run one analysis and print it as JSON
    Analyze {
        /// Strategy name or id
        strategy: String,
        /// Symbol to analyse (default: the strategy's first symbol)
        #[arg(short, long)]
        symbol: Option<String>,
        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Check a strategy config.json without registering it
    Validate {
        path: String,
    },
    /// Register strategy files found on disk
    Import,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        // Validation needs no config file.
        Command::Validate { path } => Ok(validate(&path)),
        command => {
            run(command, &cli.config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(command: Command, config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    init_tracing(&config.logging);

    match command {
        Command::Serve => {
            let state = build_state(&config).context("Failed to build application state")?;
            let imported = state.registry.import_from_disk()?;
            info!(imported, "Strategy files imported");

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received shutdown signal");
                shutdown.cancel();
            });

            server::run(&config.server.bind, &config.storage, state, cancel).await?;
        }
        Command::Analyze {
            strategy,
            symbol,
            pretty,
        } => {
            let state = build_state(&config).context("Failed to build application state")?;
            state.registry.import_from_disk()?;

            let analysis = state
                .analyze(&StrategyKey::parse(&strategy), symbol.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Analysis failed: {e}"))?;

            let output = if pretty {
                serde_json::to_string_pretty(&analysis)?
            } else {
                serde_json::to_string(&analysis)?
            };
            println!("{output}");
        }
        Command::Import => {
            let registry = build_registry(&config)?;
            let imported = registry.import_from_disk()?;
            println!("Imported {imported} strategies");
        }
        Command::Validate { path } => {
            validate(&path);
        }
    }

    Ok(())
}

fn validate(path: &str) -> ExitCode {
    match validate_strategy_file(path) {
        Ok(config) => {
            println!("{path}: ok ({})", config.name);
            ExitCode::SUCCESS
        }
        Err(errors) => {
            for message in errors {
                eprintln!("{path}: {message}");
            }
            ExitCode::FAILURE
        }
    }
}
