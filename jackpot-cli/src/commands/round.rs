use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use jackpot_core::purchase::CURRENCY_LABEL;
use jackpot_core::{
    format_time, unix_now, Address, JackpotClient, JackpotError, Result, RoundPhase, Wei,
};

#[derive(Subcommand)]
pub enum RoundCommands {
    /// Show the current round
    Status,
    /// Show tickets in the current round
    Tickets {
        /// Address to highlight (defaults to the player wallet)
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Buy tickets for the current round
    Buy {
        /// Amount to spend, in whole tokens (e.g. 0.05)
        amount: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_round_command(cmd: RoundCommands, client: &JackpotClient) -> Result<()> {
    match cmd {
        RoundCommands::Status => {
            let sync = client.load_round(client.player_address()).await?;
            let snapshot = sync.snapshot();
            let Some(round) = snapshot.round.as_ref() else {
                println!("No round data available.");
                return Ok(());
            };

            let now = unix_now();
            let phase = RoundPhase::derive(round, now, client.config().lock_period_secs, false);

            println!("Round #{}", round.id);
            println!(
                "  Pool: {} {}",
                round.total_pool,
                client.config().chain.symbol
            );
            println!("  Tickets: {}", round.num_tickets);
            println!("  Time left: {}", format_time(snapshot.time_left(now)));
            println!("  Phase: {}", phase.label());

            if round.has_winner() {
                println!(
                    "  Winner: {} (ticket #{})",
                    round.winner, round.winning_ticket_id
                );
            }

            if client.player_address().is_some() {
                println!();
                println!("Your tickets: {}", snapshot.user_tickets.len());
                println!("Win chance: {}%", snapshot.win_chance());
            }
        }

        RoundCommands::Tickets { address } => {
            let user = match address {
                Some(a) => Some(a.parse::<Address>()?),
                None => client.player_address(),
            };

            let sync = client.load_round(user).await?;
            let snapshot = sync.snapshot();
            let owners = sync.owners();

            if snapshot.round_tickets.is_empty() {
                println!("No tickets in the current round yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Ticket", "Owner", "Yours"]);

            for id in &snapshot.round_tickets {
                let owner = owners
                    .owner(*id)
                    .map(|a| a.short())
                    .unwrap_or_else(|| "unknown".to_string());
                let yours = if snapshot.user_tickets.contains(id) {
                    "yes"
                } else {
                    ""
                };
                table.add_row(vec![format!("#{}", id), owner, yours.to_string()]);
            }

            println!("{}", table);

            if let Some(user) = user {
                println!(
                    "{} holds {} of {} tickets ({}% chance)",
                    user.short(),
                    snapshot.user_tickets.len(),
                    snapshot.round_tickets.len(),
                    snapshot.win_chance()
                );
            }
        }

        RoundCommands::Buy { amount, yes } => {
            let amount = Wei::from_ether_str(&amount)?;
            let session = client.session(client.player_address(), false);
            session.sync().refresh_all().await?;

            if let Some(reason) = session.buy_disabled_message(amount) {
                println!("{}", reason);
                return Ok(());
            }

            let tickets = session.guard().tickets_for(amount);
            if !yes {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Buy {} ticket(s) for {} {}?",
                        tickets,
                        amount.to_ether_compact(),
                        CURRENCY_LABEL
                    ))
                    .default(true)
                    .interact()
                    .map_err(|e| JackpotError::dialog(e.to_string()))?;

                if !confirm {
                    println!("Purchase cancelled.");
                    return Ok(());
                }
            }

            println!("Buying {} ticket(s)...", tickets);
            let receipt = session.buy_tickets(amount).await?;

            println!("Transaction confirmed in block {}", receipt.block_number);
            println!("  {}", client.config().chain.tx_url(&receipt.tx_hash));

            let snapshot = session.sync().snapshot();
            println!(
                "You now hold {} ticket(s), {}% chance",
                snapshot.user_tickets.len(),
                snapshot.win_chance()
            );
        }
    }

    Ok(())
}
