use async_trait::async_trait;
use shared::{
    Announcer, Channel, Deliver, DeliveryError, FetchError, FileStore, PersistenceError, Platform,
    PostedStore, RunError, SqliteStore, Story, StorySource,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use url::Url;

#[derive(Default)]
struct FakeSource {
    top: Vec<u64>,
    stories: HashMap<u64, Story>,
    broken_items: HashSet<u64>,
    top_unavailable: bool,
}

impl FakeSource {
    fn with_stories(stories: &[(u64, &str)]) -> Self {
        Self {
            top: stories.iter().map(|(id, _)| *id).collect(),
            stories: stories
                .iter()
                .map(|(id, url)| (*id, Story::new(*id, format!("Story {}", id), *url)))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StorySource for FakeSource {
    async fn fetch_top_story_ids(&self) -> Result<Vec<u64>, FetchError> {
        if self.top_unavailable {
            return Err(FetchError::MissingItem(0));
        }
        Ok(self.top.clone())
    }

    async fn fetch_story(&self, id: u64) -> Result<Story, FetchError> {
        if self.broken_items.contains(&id) {
            return Err(FetchError::MissingItem(id));
        }
        self.stories
            .get(&id)
            .cloned()
            .ok_or(FetchError::MissingItem(id))
    }
}

type Sent = Arc<Mutex<Vec<(Platform, String)>>>;

#[derive(Default)]
struct RecordingDelivery {
    sent: Sent,
    failing: HashSet<Platform>,
}

#[async_trait]
impl Deliver for RecordingDelivery {
    async fn post_message(&self, channel: &Channel, text: &str) -> Result<(), DeliveryError> {
        if self.failing.contains(&channel.platform) {
            return Err(DeliveryError::RetriesExhausted { attempts: 3 });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.platform, text.to_string()));
        Ok(())
    }
}

struct BrokenStore {
    fail_reads: bool,
}

impl PostedStore for BrokenStore {
    fn is_posted(&self, _: Platform, _: u64) -> Result<bool, PersistenceError> {
        if self.fail_reads {
            return Err(PersistenceError::LockPoisoned);
        }
        Ok(false)
    }

    fn save_posted(&self, _: Platform, _: u64) -> Result<(), PersistenceError> {
        Err(PersistenceError::LockPoisoned)
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

fn channel(platform: Platform) -> Channel {
    Channel::new(
        platform,
        Some(Url::parse(&format!("https://hooks.example.com/{}", platform)).unwrap()),
    )
}

fn announcer(
    source: FakeSource,
    store: Box<dyn PostedStore>,
    delivery: RecordingDelivery,
    channels: Vec<Channel>,
    quota: usize,
) -> Announcer {
    Announcer::new(Box::new(source), store, Box::new(delivery), channels, quota)
}

fn ids_sent_to(sent: &Sent, platform: Platform) -> Vec<String> {
    sent.lock()
        .unwrap()
        .iter()
        .filter(|(p, _)| *p == platform)
        .map(|(_, text)| text.clone())
        .collect()
}

#[tokio::test]
async fn test_skips_story_without_url() {
    let dir = TempDir::new().unwrap();
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();

    let source = FakeSource::with_stories(&[(1, "http://a"), (2, ""), (3, "http://b")]);
    let run = announcer(
        source,
        Box::new(FileStore::open(dir.path()).unwrap()),
        delivery,
        vec![channel(Platform::Slack)],
        5,
    );

    let summary = run.run_once().await.unwrap();
    assert_eq!(summary.top_stories, 3);
    assert_eq!(summary.announced_to(Platform::Slack), 2);
    assert_eq!(
        ids_sent_to(&sent, Platform::Slack),
        vec!["Story 1\nhttp://a", "Story 3\nhttp://b"]
    );

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.is_posted(Platform::Slack, 1).unwrap());
    assert!(!store.is_posted(Platform::Slack, 2).unwrap());
    assert!(store.is_posted(Platform::Slack, 3).unwrap());
}

#[tokio::test]
async fn test_linkless_story_is_reevaluated_next_run() {
    let dir = TempDir::new().unwrap();
    let stories = [(1, "http://a"), (2, ""), (3, "http://b")];

    let first = announcer(
        FakeSource::with_stories(&stories),
        Box::new(FileStore::open(dir.path()).unwrap()),
        RecordingDelivery::default(),
        vec![channel(Platform::Slack)],
        5,
    );
    first.run_once().await.unwrap();

    // Story 2 gained a link between runs; only the link check kept it out
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();
    let second = announcer(
        FakeSource::with_stories(&[(1, "http://a"), (2, "http://c"), (3, "http://b")]),
        Box::new(FileStore::open(dir.path()).unwrap()),
        delivery,
        vec![channel(Platform::Slack)],
        5,
    );
    let summary = second.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Slack), 1);
    assert_eq!(ids_sent_to(&sent, Platform::Slack), vec!["Story 2\nhttp://c"]);
}

#[tokio::test]
async fn test_quota_limits_announcements_per_channel() {
    let dir = TempDir::new().unwrap();
    let stories: Vec<(u64, &str)> = (1..=8).map(|id| (id, "http://x")).collect();
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();

    let run = announcer(
        FakeSource::with_stories(&stories),
        Box::new(FileStore::open(dir.path()).unwrap()),
        delivery,
        vec![channel(Platform::Discord), channel(Platform::Slack)],
        3,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Discord), 3);
    assert_eq!(summary.announced_to(Platform::Slack), 3);
    assert_eq!(summary.total_announced(), 6);

    let store = FileStore::open(dir.path()).unwrap();
    for id in 1..=3 {
        assert!(store.is_posted(Platform::Discord, id).unwrap());
    }
    for id in 4..=8 {
        assert!(!store.is_posted(Platform::Discord, id).unwrap());
    }
    assert_eq!(sent.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn test_posted_story_is_not_redelivered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("posted_stories.db");
    let stories: Vec<(u64, &str)> = (1..=4).map(|id| (id, "http://x")).collect();

    let first = announcer(
        FakeSource::with_stories(&stories),
        Box::new(SqliteStore::open(&path).unwrap()),
        RecordingDelivery::default(),
        vec![channel(Platform::Discord)],
        2,
    );
    assert_eq!(first.run_once().await.unwrap().total_announced(), 2);

    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();
    let second = announcer(
        FakeSource::with_stories(&stories),
        Box::new(SqliteStore::open(&path).unwrap()),
        delivery,
        vec![channel(Platform::Discord)],
        2,
    );
    assert_eq!(second.run_once().await.unwrap().total_announced(), 2);

    let messages = ids_sent_to(&sent, Platform::Discord);
    assert!(messages[0].starts_with("[**Story 3**]"));
    assert!(messages[1].starts_with("[**Story 4**]"));

    // Nothing left for a third run
    let third = announcer(
        FakeSource::with_stories(&stories),
        Box::new(SqliteStore::open(&path).unwrap()),
        RecordingDelivery::default(),
        vec![channel(Platform::Discord)],
        2,
    );
    assert_eq!(third.run_once().await.unwrap().total_announced(), 0);
}

#[tokio::test]
async fn test_channels_are_deduplicated_independently() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    store.save_posted(Platform::Discord, 1).unwrap();

    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();
    let run = announcer(
        FakeSource::with_stories(&[(1, "http://a")]),
        Box::new(store),
        delivery,
        vec![channel(Platform::Discord), channel(Platform::Slack)],
        5,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Discord), 0);
    assert_eq!(summary.announced_to(Platform::Slack), 1);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_disabled_channel_is_ignored() {
    let dir = TempDir::new().unwrap();
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();

    let run = announcer(
        FakeSource::with_stories(&[(1, "http://a")]),
        Box::new(FileStore::open(dir.path()).unwrap()),
        delivery,
        vec![Channel::new(Platform::Discord, None), channel(Platform::Slack)],
        5,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced, vec![(Platform::Slack, 1)]);
    assert!(ids_sent_to(&sent, Platform::Discord).is_empty());
}

#[tokio::test]
async fn test_top_stories_failure_aborts_run() {
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();
    let source = FakeSource {
        top_unavailable: true,
        ..FakeSource::with_stories(&[(1, "http://a")])
    };

    let run = announcer(
        source,
        Box::new(SqliteStore::open_in_memory().unwrap()),
        delivery,
        vec![channel(Platform::Slack)],
        5,
    );
    let err = run.run_once().await.unwrap_err();

    assert!(matches!(err, RunError::TopStories(_)));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_item_is_skipped() {
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();
    let mut source = FakeSource::with_stories(&[(1, "http://a"), (2, "http://b")]);
    source.broken_items.insert(1);

    let run = announcer(
        source,
        Box::new(SqliteStore::open_in_memory().unwrap()),
        delivery,
        vec![channel(Platform::Slack)],
        5,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Slack), 1);
    assert_eq!(ids_sent_to(&sent, Platform::Slack), vec!["Story 2\nhttp://b"]);
}

#[tokio::test]
async fn test_delivery_failure_aborts_remaining_channels() {
    let dir = TempDir::new().unwrap();
    let delivery = RecordingDelivery {
        failing: HashSet::from([Platform::Discord]),
        ..Default::default()
    };
    let sent = delivery.sent.clone();

    let run = announcer(
        FakeSource::with_stories(&[(1, "http://a"), (2, "http://b")]),
        Box::new(FileStore::open(dir.path()).unwrap()),
        delivery,
        vec![channel(Platform::Discord), channel(Platform::Slack)],
        5,
    );
    let err = run.run_once().await.unwrap_err();

    match err {
        RunError::Delivery {
            platform, story_id, ..
        } => {
            assert_eq!(platform, Platform::Discord);
            assert_eq!(story_id, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Slack comes after Discord and never got its turn
    assert!(sent.lock().unwrap().is_empty());

    let store = FileStore::open(dir.path()).unwrap();
    assert!(!store.is_posted(Platform::Discord, 1).unwrap());
    assert!(!store.is_posted(Platform::Slack, 1).unwrap());
}

#[tokio::test]
async fn test_unreadable_store_skips_stories() {
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();

    let run = announcer(
        FakeSource::with_stories(&[(1, "http://a")]),
        Box::new(BrokenStore { fail_reads: true }),
        delivery,
        vec![channel(Platform::Slack)],
        5,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Slack), 0);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_save_still_counts_delivery() {
    let delivery = RecordingDelivery::default();
    let sent = delivery.sent.clone();

    let run = announcer(
        FakeSource::with_stories(&[(1, "http://a"), (2, "http://b"), (3, "http://c")]),
        Box::new(BrokenStore { fail_reads: false }),
        delivery,
        vec![channel(Platform::Slack)],
        2,
    );
    let summary = run.run_once().await.unwrap();

    assert_eq!(summary.announced_to(Platform::Slack), 2);
    assert_eq!(sent.lock().unwrap().len(), 2);
}
