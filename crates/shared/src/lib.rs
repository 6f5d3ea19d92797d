// Public modules
pub mod announce;
pub mod config;
pub mod error;
pub mod hackernews;
pub mod models;
pub mod storage;
pub mod webhook;

// Re-export commonly used types
pub use announce::{Announcer, RunError, RunSummary};
pub use config::{Config, StorageKind};
pub use error::{DeliveryError, FetchError, PersistenceError};
pub use hackernews::{HackerNewsClient, StorySource};
pub use models::{Channel, Platform, Story};
pub use storage::{open_store, FileStore, PostedStore, SqliteStore};
pub use webhook::{Deliver, RetryPolicy, WebhookClient, WebhookPayload};
