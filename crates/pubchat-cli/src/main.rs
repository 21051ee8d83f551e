mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Flow, HELP, PROMPT, broadcast_line, execute, parse};
use pubchat::{ClientConfig, Session};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "pubchat", about = "pubchat interactive client")]
struct Cli {
    /// Broker command endpoint (default: $PUBCHAT_BROKER or tcp://broker:5555).
    #[arg(long)]
    broker: Option<String>,

    /// Fan-out proxy endpoint (default: $PUBCHAT_PROXY or tcp://proxy:5558).
    #[arg(long)]
    proxy: Option<String>,

    /// Give up on a request after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pubchat_cli=warn,pubchat=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::with_overrides(cli.broker, cli.proxy, cli.timeout_ms);

    let (mut session, subscriber) = Session::connect(&config)
        .await
        .context("failed to connect")?;
    println!("Connected to the messaging system");

    let mut broadcasts = session.listen(subscriber);
    tokio::spawn(async move {
        while let Some(broadcast) = broadcasts.recv().await {
            print!("{}", broadcast_line(&broadcast));
            std::io::stdout().flush().ok();
        }
    });

    println!("=== pubchat ===");
    println!("Commands:");
    for line in HELP {
        println!("{line}");
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };

        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let (flow, output) = execute(&mut session, command).await;
        println!("{output}");
        if flow == Flow::Quit {
            break;
        }
    }

    session.close().await;
    Ok(())
}
