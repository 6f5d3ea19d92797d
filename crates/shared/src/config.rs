use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::models::{Channel, Platform};

pub const DEFAULT_SCHEDULE_PERIOD_MINUTES: u64 = 60;
pub const DEFAULT_FETCH_TOP_STORIES_AMOUNT: usize = 5;
/// One year; longer periods are treated as a configuration mistake
pub const MAX_SCHEDULE_PERIOD_MINUTES: u64 = 365 * 24 * 60;
pub const DEFAULT_DB_PATH: &str = "/app/data/posted_stories.db";

/// Which backend keeps track of posted stories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// One append-only text file per platform
    Local { dir: PathBuf },
    /// SQLite database file
    Database { path: PathBuf },
}

impl StorageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Local { .. } => "local",
            StorageKind::Database { .. } => "database",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_webhook_url: Option<Url>,
    pub slack_webhook_url: Option<Url>,
    pub schedule_period: Duration,
    pub fetch_top_stories_amount: usize,
    pub storage: StorageKind,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_webhook_url = parse_webhook(&lookup, "DISCORD_WEBHOOK_URL")?;
        let slack_webhook_url = parse_webhook(&lookup, "SLACK_WEBHOOK_URL")?;

        let period_minutes = parse_or_default(
            &lookup,
            "SCHEDULE_PERIOD",
            DEFAULT_SCHEDULE_PERIOD_MINUTES,
        );
        if period_minutes == 0 {
            anyhow::bail!("SCHEDULE_PERIOD must be at least 1 minute");
        }
        if period_minutes > MAX_SCHEDULE_PERIOD_MINUTES {
            anyhow::bail!(
                "SCHEDULE_PERIOD must be at most {} minutes, got {}",
                MAX_SCHEDULE_PERIOD_MINUTES,
                period_minutes
            );
        }

        let fetch_top_stories_amount = parse_or_default(
            &lookup,
            "FETCH_TOP_STORIES_AMOUNT",
            DEFAULT_FETCH_TOP_STORIES_AMOUNT,
        );

        let storage_type = lookup("STORAGE").unwrap_or_else(|| "local".to_string());
        let storage = match storage_type.trim().to_lowercase().as_str() {
            "" | "local" | "file" => StorageKind::Local {
                dir: lookup("STORAGE_DIR")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            },
            "database" | "sqlite" => StorageKind::Database {
                path: lookup("DB_PATH")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            },
            other => anyhow::bail!(
                "Unknown STORAGE value: {}. Use 'local' or 'database'",
                other
            ),
        };

        Ok(Self {
            discord_webhook_url,
            slack_webhook_url,
            schedule_period: Duration::from_secs(period_minutes * 60),
            fetch_top_stories_amount,
            storage,
        })
    }

    /// All known channels, enabled or not, in announcement order.
    pub fn channels(&self) -> Vec<Channel> {
        Platform::ALL
            .iter()
            .map(|platform| {
                let url = match platform {
                    Platform::Discord => self.discord_webhook_url.clone(),
                    Platform::Slack => self.slack_webhook_url.clone(),
                };
                Channel::new(*platform, url)
            })
            .collect()
    }

    fn try_load_dotenv() {
        // 1. Current directory (for development and container volumes)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/hn-announcer/.env
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("hn-announcer").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

fn parse_webhook<F>(lookup: &F, key: &str) -> Result<Option<Url>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            let url = Url::parse(value.trim())
                .with_context(|| format!("{} is not a valid URL", key))?;
            Ok(Some(url))
        }
        _ => Ok(None),
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "ignoring unparsable setting");
                default
            }
        },
        None => default,
    }
}
