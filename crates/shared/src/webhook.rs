use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::models::{Channel, Platform};

pub const BOT_USERNAME: &str = "Hacker News Bot";

/// Sends an already formatted announcement to a channel.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn post_message(&self, channel: &Channel, text: &str) -> Result<(), DeliveryError>;
}

/// JSON body expected by each platform's incoming webhooks.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WebhookPayload<'a> {
    Discord {
        content: &'a str,
        username: &'a str,
    },
    Slack {
        text: &'a str,
    },
}

impl<'a> WebhookPayload<'a> {
    pub fn for_platform(platform: Platform, text: &'a str) -> Self {
        match platform {
            Platform::Discord => WebhookPayload::Discord {
                content: text,
                username: BOT_USERNAME,
            },
            Platform::Slack => WebhookPayload::Slack { text },
        }
    }
}

/// How long to back off when a webhook answers 429, and how often to try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cooldown,
        }
    }

    /// Drive `attempt` until it returns a non-429 status or attempts run out.
    ///
    /// Only 429 is retried. Any other non-2xx status, and any error returned
    /// by `attempt` itself, ends the loop immediately. Returns the number of
    /// attempts it took to succeed.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<u32, DeliveryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<StatusCode, DeliveryError>>,
    {
        for n in 1..=self.max_attempts {
            let status = attempt(n).await?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                if n < self.max_attempts {
                    warn!(
                        attempt = n,
                        cooldown_secs = self.cooldown.as_secs_f64(),
                        "webhook rate limited, cooling down before retry"
                    );
                    tokio::time::sleep(self.cooldown).await;
                }
                continue;
            }

            if !status.is_success() {
                return Err(DeliveryError::Status(status));
            }

            return Ok(n);
        }

        Err(DeliveryError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }
}

pub struct WebhookClient {
    client: Client,
    retry: RetryPolicy,
}

impl WebhookClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Deliver for WebhookClient {
    async fn post_message(&self, channel: &Channel, text: &str) -> Result<(), DeliveryError> {
        let platform = channel.platform;
        let url = channel
            .webhook_url
            .as_ref()
            .ok_or(DeliveryError::Disabled(platform.as_str()))?;

        let body = serde_json::to_string(&WebhookPayload::for_platform(platform, text))?;

        let attempts = self
            .retry
            .run(|attempt| {
                let request = self
                    .client
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
                async move {
                    debug!(%platform, attempt, "posting to webhook");
                    let response = request.send().await.map_err(DeliveryError::Transport)?;
                    Ok::<_, DeliveryError>(response.status())
                }
            })
            .await?;

        // The webhook path carries the token, only the host goes to the log
        info!(
            %platform,
            webhook_host = url.host_str().unwrap_or_default(),
            payload = %body,
            attempts,
            "posted to webhook"
        );
        Ok(())
    }
}
