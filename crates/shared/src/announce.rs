use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, FetchError};
use crate::hackernews::StorySource;
use crate::models::{Channel, Platform};
use crate::storage::PostedStore;
use crate::webhook::Deliver;

/// Why a run ended early.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to fetch top stories: {0}")]
    TopStories(#[source] FetchError),

    #[error("failed to post story {story_id} to {platform}: {source}")]
    Delivery {
        platform: Platform,
        story_id: u64,
        #[source]
        source: DeliveryError,
    },
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub top_stories: usize,
    /// New stories announced per enabled channel, in processing order
    pub announced: Vec<(Platform, usize)>,
}

impl RunSummary {
    pub fn announced_to(&self, platform: Platform) -> usize {
        self.announced
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total_announced(&self) -> usize {
        self.announced.iter().map(|(_, count)| count).sum()
    }
}

/// Fetches top stories and announces the ones each channel has not seen yet.
pub struct Announcer {
    source: Box<dyn StorySource>,
    store: Box<dyn PostedStore>,
    delivery: Box<dyn Deliver>,
    channels: Vec<Channel>,
    quota: usize,
}

impl Announcer {
    pub fn new(
        source: Box<dyn StorySource>,
        store: Box<dyn PostedStore>,
        delivery: Box<dyn Deliver>,
        channels: Vec<Channel>,
        quota: usize,
    ) -> Self {
        Self {
            source,
            store,
            delivery,
            channels,
            quota,
        }
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.is_enabled())
    }

    /// One full pass over every enabled channel.
    ///
    /// A failed delivery stops the whole run, including channels that have
    /// not been processed yet.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();

        let top_stories = self
            .source
            .fetch_top_story_ids()
            .await
            .map_err(RunError::TopStories)?;
        debug!(count = top_stories.len(), "fetched top stories");

        let mut announced = Vec::new();
        for channel in self.enabled_channels() {
            let count = self.announce_to(channel, &top_stories).await?;
            info!(platform = %channel.platform, announced = count, "channel done");
            announced.push((channel.platform, count));
        }

        Ok(RunSummary {
            started_at,
            top_stories: top_stories.len(),
            announced,
        })
    }

    async fn announce_to(&self, channel: &Channel, story_ids: &[u64]) -> Result<usize, RunError> {
        let platform = channel.platform;
        let mut announced = 0;

        for &story_id in story_ids {
            if announced >= self.quota {
                break;
            }

            match self.store.is_posted(platform, story_id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    // Unknown state: skip rather than risk a duplicate post
                    warn!(%platform, story_id, error = %e, "could not check if story was posted");
                    continue;
                }
            }

            let story = match self.source.fetch_story(story_id).await {
                Ok(story) => story,
                Err(e) => {
                    warn!(%platform, story_id, error = %e, "failed to fetch story details");
                    continue;
                }
            };

            if !story.has_link() {
                debug!(%platform, story_id, "story has no link, skipping");
                continue;
            }

            let message = platform.format_message(&story);
            if let Err(source) = self.delivery.post_message(channel, &message).await {
                error!(%platform, story_id, error = %source, "failed to post story");
                return Err(RunError::Delivery {
                    platform,
                    story_id,
                    source,
                });
            }

            if let Err(e) = self.store.save_posted(platform, story_id) {
                error!(%platform, story_id, error = %e, "failed to record posted story");
            }

            announced += 1;
        }

        Ok(announced)
    }
}
