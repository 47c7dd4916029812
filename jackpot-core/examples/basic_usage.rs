use jackpot_core::{format_time, JackpotClient, JackpotConfig};
use tempfile::tempdir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // JACKPOT_CONTRACT and JACKPOT_RPC come from the environment
    let config = JackpotConfig::load(None)?;

    let temp_dir = tempdir()?;
    println!("Using temporary directory: {:?}", temp_dir.path());

    let client = JackpotClient::new(config, temp_dir.path()).await?;

    let sync = client.load_round(client.player_address()).await?;
    let snapshot = sync.snapshot();

    match &snapshot.round {
        Some(round) => {
            println!("Round #{}", round.id);
            println!("Pool: {} {}", round.total_pool, client.config().chain.symbol);
            println!("Tickets: {}", round.num_tickets);
            println!(
                "Time left: {}",
                format_time(snapshot.time_left(jackpot_core::unix_now()))
            );
            println!("Your chance: {}%", snapshot.win_chance());
        }
        None => println!("No round data"),
    }

    if let Ok(winners) = client.history(5).await {
        println!("\nRecent winners: {}", winners.len());
        for w in winners {
            println!("  round {} -> {} ({})", w.round_id, w.winner.short(), w.prize);
        }
    }

    Ok(())
}
