use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use forktable::logging::init_tracing;
use forktable::{PhilosopherClient, PhilosopherId};
use philosopher::{DelayRange, DinerConfig, dine};

/// A dining philosopher that asks a forktable server for its forks.
#[derive(Debug, Parser)]
#[command(name = "philosopher", version)]
struct Args {
    /// Address of the forktable server.
    #[arg(long, short, env = "FORKTABLE_SERVER", default_value = "localhost:12345")]
    server: String,

    /// This philosopher's seat, in [0, forks).
    #[arg(long, short)]
    id: usize,

    /// Stop after this many meals (default: dine until interrupted).
    #[arg(long, short)]
    meals: Option<u64>,

    /// Thinking time range in milliseconds.
    #[arg(long, default_value_t = DelayRange::default())]
    think_ms: DelayRange,

    /// Eating time range in milliseconds.
    #[arg(long, default_value_t = DelayRange::default())]
    eat_ms: DelayRange,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let id = PhilosopherId::new(args.id);
    let config = DinerConfig {
        think: args.think_ms,
        eat: args.eat_ms,
        meals: args.meals,
    };

    let mut client = PhilosopherClient::connect(args.server.as_str(), id).await?;
    info!(philosopher = %id, server = %args.server, "Seated at table");

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let report = dine(&mut client, &config, &shutdown).await?;
    // Closing the connection frees anything granted after an abandoned request.
    drop(client);
    info!(
        philosopher = %id,
        meals = report.meals,
        waited = ?report.waited,
        abandoned_request = report.abandoned_request,
        "Leaving the table"
    );
    Ok(())
}
