use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::FetchError;
use crate::models::Story;

pub const HN_API_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

/// Where top stories come from.
#[async_trait]
pub trait StorySource: Send + Sync {
    /// Ranked story ids, best first.
    async fn fetch_top_story_ids(&self) -> Result<Vec<u64>, FetchError>;

    async fn fetch_story(&self, id: u64) -> Result<Story, FetchError>;
}

pub struct HackerNewsClient {
    client: Client,
    base_url: String,
}

impl HackerNewsClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(HN_API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("hn-announcer/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl StorySource for HackerNewsClient {
    async fn fetch_top_story_ids(&self) -> Result<Vec<u64>, FetchError> {
        let url = format!("{}/topstories.json", self.base_url);
        self.get_json(url).await
    }

    async fn fetch_story(&self, id: u64) -> Result<Story, FetchError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        let story: Option<Story> = self.get_json(url).await?;
        story.ok_or(FetchError::MissingItem(id))
    }
}
