//! pubchat-bot — autonomous participant that keeps a chat busy.
//!
//! Connects to the broker and the fan-out proxy, logs in under a random
//! persona and publishes canned phrases forever. Only a failed connect or
//! login stops it.

use anyhow::{Context, Result};
use clap::Parser;
use pubchat::{ClientConfig, Session};
use pubchat_bot::{Bot, BotConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pubchat-bot", about = "pubchat autonomous bot")]
struct Args {
    /// Broker command endpoint (default: $PUBCHAT_BROKER or tcp://broker:5555).
    #[arg(long)]
    broker: Option<String>,

    /// Fan-out proxy endpoint (default: $PUBCHAT_PROXY or tcp://proxy:5558).
    #[arg(long)]
    proxy: Option<String>,

    /// Give up on a request after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Messages per batch.
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Shortest pause between messages, in seconds.
    #[arg(long, default_value_t = 1)]
    min_pause_secs: u64,

    /// Longest pause between messages, in seconds.
    #[arg(long, default_value_t = 3)]
    max_pause_secs: u64,

    /// Pause between batches, in seconds.
    #[arg(long, default_value_t = 10)]
    cycle_pause_secs: u64,

    /// Seed the random generator for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pubchat_bot=info,pubchat=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::with_overrides(args.broker, args.proxy, args.timeout_ms);
    let bot_config = BotConfig {
        batch_size: args.batch_size,
        min_pause: Duration::from_secs(args.min_pause_secs),
        max_pause: Duration::from_secs(args.max_pause_secs),
        cycle_pause: Duration::from_secs(args.cycle_pause_secs),
        ..BotConfig::default()
    };
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (session, subscriber) = Session::connect(&config)
        .await
        .context("failed to connect")?;

    let mut bot = Bot::new(session, bot_config, rng);
    let mut broadcasts = bot.start(subscriber).await.context("login failed")?;

    tokio::spawn(async move {
        while let Some(broadcast) = broadcasts.recv().await {
            tracing::info!(%broadcast, "received");
        }
    });

    tokio::select! {
        _ = bot.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }
    Ok(())
}
