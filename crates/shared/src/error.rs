use reqwest::StatusCode;

/// Failures talking to the Hacker News API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The item endpoint answers `null` for deleted or unknown ids.
    #[error("item {0} does not exist")]
    MissingItem(u64),
}

/// Failures posting to a webhook.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no webhook configured for {0}")]
    Disabled(&'static str),

    #[error("failed to encode webhook payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("webhook request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("webhook request failed with status: {0}")]
    Status(StatusCode),

    #[error("webhook still rate limited after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Failures of the posted-story store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
