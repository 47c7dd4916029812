use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use jackpot_core::{JackpotClient, Result};

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List recent winners
    List {
        /// Number of winners to show
        #[arg(short, long, default_value = "10")]
        limit: u64,
        /// Read the local cache only
        #[arg(long)]
        offline: bool,
    },
}

pub async fn handle_history_command(cmd: HistoryCommands, client: &JackpotClient) -> Result<()> {
    match cmd {
        HistoryCommands::List { limit, offline } => {
            let winners = if offline {
                client.cached_history(limit).await?
            } else {
                match client.history(limit).await {
                    Ok(winners) => winners,
                    Err(e) => {
                        tracing::warn!("Could not load winners from chain: {}", e);
                        println!("Showing cached winners.");
                        client.cached_history(limit).await?
                    }
                }
            };

            if winners.is_empty() {
                println!("No winners yet.");
                return Ok(());
            }

            let symbol = &client.config().chain.symbol;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Round", "Winner", "Ticket", "Prize", "Date"]);

            for w in winners {
                let date = w
                    .date()
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(vec![
                    format!("#{}", w.round_id),
                    w.winner.short(),
                    format!("#{}", w.winning_ticket_id),
                    format!("{} {}", w.prize, symbol),
                    date,
                ]);
            }

            println!("{}", table);
        }
    }

    Ok(())
}
