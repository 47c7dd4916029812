use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use jackpot_core::config::ChainConfig;
use jackpot_core::{
    format_time, unix_now, CompletionOutcome, DrawEvent, JackpotClient, JackpotError, Notification,
    NotificationKind, Result,
};
use tokio::sync::broadcast::error::RecvError;

#[derive(Subcommand)]
pub enum KeeperCommands {
    /// Follow the current round until Ctrl-C
    Watch {
        /// Complete expired rounds with the admin key
        #[arg(short, long)]
        auto_complete: bool,
    },
    /// Run one completion sequence for the current round
    Complete,
    /// Show recorded completion attempts
    Attempts {
        /// Only attempts for this round
        #[arg(short, long)]
        round: Option<u64>,
        /// Number of attempts to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

pub async fn handle_keeper_command(cmd: KeeperCommands, client: &JackpotClient) -> Result<()> {
    match cmd {
        KeeperCommands::Watch { auto_complete } => {
            let session = client.session(client.player_address(), auto_complete);
            let mut notes = session.notifications().subscribe();
            let mut draws = session
                .take_draw_events()
                .ok_or_else(|| JackpotError::internal("Draw events already consumed"))?;
            let chain = client.config().chain.clone();

            println!("Watching round state. Press Ctrl-C to stop.");

            let printer = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        note = notes.recv() => match note {
                            Ok(n) => print_notification(&n, &chain),
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::debug!("Skipped {} notifications", skipped);
                            }
                            Err(RecvError::Closed) => break,
                        },
                        Some(event) = draws.recv() => print_draw(&event),
                    }
                }
            });

            session
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            printer.abort();

            if let Some(round) = session.sync().current_round() {
                println!(
                    "Stopped at round #{} with {} left",
                    round.id,
                    format_time(session.time_left())
                );
            }
        }

        KeeperCommands::Complete => {
            let keeper = client
                .keeper()
                .ok_or_else(|| JackpotError::MissingKey("JACKPOT_ADMIN_PRIVATE_KEY".to_string()))?;

            let sync = client.load_round(None).await?;
            let Some(round) = sync.current_round() else {
                println!("No round data available.");
                return Ok(());
            };

            if round.completed {
                println!("Round #{} is already completed.", round.id);
                return Ok(());
            }

            let left = sync.snapshot().time_left(unix_now());
            if left > 0 {
                println!(
                    "Round #{} still has {} left; nothing to complete.",
                    round.id,
                    format_time(left)
                );
                return Ok(());
            }

            println!("Completing round #{}...", round.id);
            match keeper.complete_round(round.id).await {
                CompletionOutcome::Completed { tx_hash, attempts } => {
                    println!("Round completed after {} attempt(s)", attempts);
                    println!("  {}", client.config().chain.tx_url(&tx_hash));
                }
                CompletionOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    return Err(JackpotError::contract(format!(
                        "Failed to complete round after {} attempts: {}",
                        attempts, last_error
                    )));
                }
                CompletionOutcome::AlreadyRunning => {
                    println!("A completion is already in progress.");
                }
            }
        }

        KeeperCommands::Attempts { round, limit } => {
            let attempts = client.attempts(round, limit).await?;

            if attempts.is_empty() {
                println!("No completion attempts recorded.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Round", "Attempt", "Result", "Detail", "Time"]);

            for a in attempts {
                let detail = a.tx_hash.or(a.error).unwrap_or_default();
                table.add_row(vec![
                    a.round_id.to_string(),
                    a.attempt.to_string(),
                    if a.success { "ok" } else { "failed" }.to_string(),
                    detail,
                    a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]);
            }

            println!("{}", table);
        }
    }

    Ok(())
}

fn print_notification(n: &Notification, chain: &ChainConfig) {
    let tag = match n.kind {
        NotificationKind::Info => "info",
        NotificationKind::Success => "ok",
        NotificationKind::Warning => "warn",
        NotificationKind::Error => "error",
    };
    match &n.tx_hash {
        Some(hash) => println!("[{}] {} {}", tag, n.message, chain.tx_url(hash)),
        None => println!("[{}] {}", tag, n.message),
    }
}

fn print_draw(event: &DrawEvent) {
    match event {
        DrawEvent::Candidate(ticket) => {
            println!("  drawing... ticket #{}", ticket.id);
        }
        DrawEvent::Winner(reveal) => {
            let owner = reveal.ticket.owner.as_deref().unwrap_or("unknown");
            let suffix = if reveal.ticket.is_user { " (you!)" } else { "" };
            if reveal.fallback {
                println!(
                    "Round #{}: ticket #{} ({}) shown, winner not yet recorded",
                    reveal.round_id, reveal.ticket.id, owner
                );
            } else {
                println!(
                    "Round #{} winner: ticket #{} owned by {}{}, prize {}",
                    reveal.round_id, reveal.ticket.id, owner, suffix, reveal.prize
                );
            }
        }
        DrawEvent::Unresolved(round_id) => {
            println!("Round #{} had no tickets to draw", round_id);
        }
    }
}
