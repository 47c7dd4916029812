use crate::config::CliConfig;
use clap::Subcommand;
use jackpot_core::{JackpotConfig, Result};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

pub fn handle_config_command(
    cmd: ConfigCommands,
    config: &JackpotConfig,
    cli: &CliConfig,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("Config file: {}", cli.config_path().display());
            println!("Data directory: {}", cli.data_dir.display());
            println!();
            // private keys are never serialized
            println!("{}", serde_json::to_string_pretty(config)?);
            println!();
            println!("Admin key: {}", key_state(config.admin_private_key.is_some()));
            println!("Player key: {}", key_state(config.player_private_key.is_some()));
        }
    }

    Ok(())
}

fn key_state(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "not set"
    }
}
