use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Discussion page for a story on Hacker News
pub const HN_DISCUSSION_URL: &str = "https://news.ycombinator.com/item?id=";

/// A story as returned by the item endpoint.
///
/// Text-only posts (Ask HN and friends) come back without a `url`, which
/// decodes to an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

impl Story {
    pub fn new(id: u64, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn has_link(&self) -> bool {
        !self.url.trim().is_empty()
    }

    pub fn discussion_url(&self) -> String {
        format!("{}{}", HN_DISCUSSION_URL, self.id)
    }
}

/// The chat platforms stories can be announced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Discord,
    Slack,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Discord, Platform::Slack];

    /// Key used in persisted state and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Slack => "slack",
        }
    }

    /// Render the announcement text for a story.
    pub fn format_message(&self, story: &Story) -> String {
        match self {
            Platform::Discord => format!(
                "[**{}**]({})    [(comment)]({})",
                story.title,
                story.url,
                story.discussion_url()
            ),
            Platform::Slack => format!("{}\n{}", story.title, story.url),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An announcement destination. A channel without a webhook is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub platform: Platform,
    pub webhook_url: Option<Url>,
}

impl Channel {
    pub fn new(platform: Platform, webhook_url: Option<Url>) -> Self {
        Self {
            platform,
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}
