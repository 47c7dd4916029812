mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use jackpot_core::{JackpotClient, JackpotConfig, JackpotError};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jackpot")]
#[command(about = "Jackpot keeper - follow, play and settle on-chain jackpot rounds")]
#[command(version)]
struct Cli {
    /// Data directory for the local database and config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to <data-dir>/jackpot.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current round commands
    #[command(subcommand)]
    Round(commands::RoundCommands),

    /// Automatic round completion
    #[command(subcommand)]
    Keeper(commands::KeeperCommands),

    /// Past winners
    #[command(subcommand)]
    History(commands::HistoryCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(commands::ConfigCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cli_config = CliConfig::new(cli.data_dir, cli.config, cli.verbose);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(cli_config.log_filter()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Ensure data directory exists
    tokio::fs::create_dir_all(&cli_config.data_dir).await?;

    let result = run(cli.command, &cli_config).await;

    if let Err(e) = result {
        match e {
            JackpotError::WrongNetwork { expected, actual } => {
                eprintln!("Error: Connected to chain {}, expected {}", actual, expected);
                eprintln!("Check JACKPOT_RPC and JACKPOT_CHAIN_ID");
            }
            JackpotError::MissingKey(var) => {
                eprintln!("Error: Private key not configured");
                eprintln!("Set {} in the environment", var);
            }
            JackpotError::Config(msg) => {
                eprintln!("Error: {}", msg);
                eprintln!("Use 'jackpot config show' to inspect the effective configuration");
            }
            JackpotError::BuyingLocked { lock_period } => {
                eprintln!("Error: Buying disabled in last {} seconds", lock_period);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, cli_config: &CliConfig) -> jackpot_core::Result<()> {
    let config = JackpotConfig::load(Some(&cli_config.config_path()))?;

    match command {
        // config show must work before a contract address is set
        Commands::Config(cmd) => commands::handle_config_command(cmd, &config, cli_config),
        command => {
            let client = JackpotClient::new(config, &cli_config.data_dir).await?;

            match command {
                Commands::Round(cmd) => commands::handle_round_command(cmd, &client).await,
                Commands::Keeper(cmd) => commands::handle_keeper_command(cmd, &client).await,
                Commands::History(cmd) => commands::handle_history_command(cmd, &client).await,
                Commands::Config(_) => Ok(()),
            }
        }
    }
}
