//! jibe: command-line client for a jibe-server.
//!
//! Usage:
//!   jibe generate "<prompt>"           Submit one message and wait for the reply
//!   jibe points                        Show balance and per-reason totals
//!   jibe history [--page N] [--page-size N]
//!   jibe share                         Show the share link and its clicks
//!   jibe refer <referrer-id>           Record who referred you

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jibe_client::{ApiClient, PollOutcome, PollSlot, Poller};
use jibe_types::ChatMessage;

/// Command-line client for the jibe generation service
#[derive(Parser)]
#[command(name = "jibe", version, about = "Talk to a jibe-server from the terminal")]
struct Cli {
    /// Base URL of the server
    #[arg(long, env = "JIBE_SERVER", default_value = "http://127.0.0.1:3000", global = true)]
    server: String,

    /// Bearer token issued by `POST /admin/users`
    #[arg(long, env = "JIBE_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a prompt and wait for the generated reply
    Generate {
        prompt: String,

        /// Seconds between status checks
        #[arg(long, default_value = "2")]
        interval: u64,

        /// Give up after this many status checks
        #[arg(long, default_value = "60")]
        max_attempts: u32,
    },

    /// Show the current balance and ledger totals
    Points,

    /// List ledger entries, newest first
    History {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "10")]
        page_size: u32,
    },

    /// Show your share link, its clicks and referral rewards
    Share,

    /// Record the user who referred you
    Refer { referrer_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(token) = cli.token else {
        bail!("no token given; pass --token or set JIBE_TOKEN");
    };
    let client = ApiClient::new(&cli.server, token)?;

    match cli.command {
        Commands::Generate {
            prompt,
            interval,
            max_attempts,
        } => {
            cmd_generate(
                client,
                prompt,
                Poller::new(std::time::Duration::from_secs(interval.max(1)), max_attempts),
            )
            .await
        }
        Commands::Points => cmd_points(&client).await,
        Commands::History { page, page_size } => cmd_history(&client, page, page_size).await,
        Commands::Share => cmd_share(&client).await,
        Commands::Refer { referrer_id } => {
            let referral = client.create_referral(&referrer_id).await?;
            println!("referral {} recorded at {}", referral.id, referral.created_at);
            Ok(())
        }
    }
}

async fn cmd_generate(client: ApiClient, prompt: String, poller: Poller) -> Result<()> {
    let client = Arc::new(client);
    let task_id = client.generate(vec![ChatMessage::user(prompt)]).await?;
    eprintln!("task {task_id} queued; waiting for the reply...");

    let mut slot = PollSlot::new(Arc::clone(&client), poller);
    slot.track(task_id);
    match slot.wait().await {
        Some(PollOutcome::Completed { result, points }) => {
            println!("{result}");
            eprintln!("remaining points: {points}");
            Ok(())
        }
        Some(PollOutcome::Failed { error }) => bail!("generation failed: {error}"),
        Some(PollOutcome::TimedOut { attempts }) => {
            bail!("no reply after {attempts} status checks; the task may still finish later")
        }
        None => bail!("polling was interrupted"),
    }
}

async fn cmd_points(client: &ApiClient) -> Result<()> {
    let stats = client.points_stats().await?;
    println!("Current points:        {}", stats.current_points);
    println!("Generations completed: {}", stats.generations_count);
    println!("Generations left:      {}", stats.remaining_generations);
    if !stats.transaction_stats.is_empty() {
        println!();
        for total in &stats.transaction_stats {
            println!("  {:<14} {:>8}", total.reason, total.total);
        }
    }
    Ok(())
}

async fn cmd_history(client: &ApiClient, page: u32, page_size: u32) -> Result<()> {
    let history = client.points_history(page, page_size).await?;
    if history.data.is_empty() {
        println!("No ledger entries.");
        return Ok(());
    }
    for entry in &history.data {
        println!(
            "{}  {:>6}  {:<12} {}",
            entry.created_at,
            entry.amount,
            entry.reason,
            entry.task_id.as_deref().unwrap_or("-")
        );
    }
    let p = &history.pagination;
    println!("page {} of {} ({} entries)", p.page, p.total_pages.max(1), p.total);
    Ok(())
}

async fn cmd_share(client: &ApiClient) -> Result<()> {
    let stats = client.share_stats().await?;
    println!("Share link:            {}", stats.share_link);
    println!("Clicks:                {}", stats.total_clicks);
    println!("Referrals:             {}", stats.successful_referrals);
    println!("Points from referrals: {}", stats.points_earned);
    Ok(())
}
