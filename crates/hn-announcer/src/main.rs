use anyhow::{Context, Result};
use clap::Parser;
use shared::{open_store, Announcer, Config, HackerNewsClient, WebhookClient};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hn-announcer")]
#[command(about = "Announce new Hacker News top stories to Discord and Slack webhooks")]
struct Args {
    /// Run a single announcement pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let store = open_store(&config.storage).context("Failed to initialize storage")?;
    info!(backend = store.backend_name(), "storage ready");

    let channels = config.channels();
    let enabled: Vec<_> = channels
        .iter()
        .filter(|c| c.is_enabled())
        .map(|c| c.platform.as_str())
        .collect();
    if enabled.is_empty() {
        warn!("no webhook configured, nothing will be announced");
    } else {
        info!(channels = ?enabled, "announcing to");
    }

    let announcer = Announcer::new(
        Box::new(HackerNewsClient::new()?),
        store,
        Box::new(WebhookClient::new()?),
        channels,
        config.fetch_top_stories_amount,
    );

    if args.once {
        let summary = announcer.run_once().await?;
        info!(announced = summary.total_announced(), "single run finished");
        return Ok(());
    }

    // First tick completes immediately, which gives the startup run
    let mut ticker = tokio::time::interval(config.schedule_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        period_minutes = config.schedule_period.as_secs() / 60,
        quota = config.fetch_top_stories_amount,
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                return Ok(());
            }
        }

        match announcer.run_once().await {
            Ok(summary) => info!(
                started_at = %summary.started_at,
                top_stories = summary.top_stories,
                announced = summary.total_announced(),
                "run finished"
            ),
            Err(e) => error!(error = %e, "error in fetch and post routine"),
        }
    }
}
