//! Shared fixtures: an in-memory store plus a media backend that records calls

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamhub::config::FeedConfig;
use streamhub::error::{Error, Result};
use streamhub::feed::{FeedItem, FeedPipeline, Page, PageRequest};
use streamhub::media::{MediaKind, MediaStorage, MediaUpload};
use streamhub::models::{Content, ContentId, MediaAsset, Profile, ProfileId};
use streamhub::services::{ContentService, NewContent, SocialService};
use streamhub::store::{ContentCounter, ContentRepository};
use streamhub::views::ViewTrigger;
use streamhub::MemoryStore;

/// Media backend that keeps track of what is currently stored
#[derive(Default)]
pub struct RecordingStorage {
    counter: AtomicUsize,
    pub stored: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_kind: Mutex<Option<MediaKind>>,
}

impl RecordingStorage {
    pub fn fail_uploads_of(&self, kind: MediaKind) {
        *self.fail_kind.lock().unwrap() = Some(kind);
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStorage for RecordingStorage {
    async fn upload(&self, upload: MediaUpload) -> Result<MediaAsset> {
        if *self.fail_kind.lock().unwrap() == Some(upload.kind) {
            return Err(Error::storage("simulated upload failure"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let public_id = format!("{}-{}", upload.kind.resource_type(), n);
        self.stored.lock().unwrap().push(public_id.clone());
        Ok(MediaAsset {
            url: format!("https://cdn.test/{}", public_id),
            public_id,
            format: Some("mp4".into()),
            duration_secs: Some(12.5),
            bytes: Some(upload.data.len() as i64),
        })
    }

    async fn delete(&self, public_id: &str, _kind: MediaKind) -> Result<()> {
        self.stored.lock().unwrap().retain(|id| id != public_id);
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// Content store that refuses every new record and delegates everything else
pub struct RejectingInserts(pub Arc<MemoryStore>);

#[async_trait]
impl ContentRepository for RejectingInserts {
    async fn run_feed(&self, pipeline: &FeedPipeline, page: PageRequest) -> Result<Page<FeedItem>> {
        self.0.run_feed(pipeline, page).await
    }

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>> {
        self.0.find_content(id).await
    }

    async fn insert_content(&self, _content: &Content) -> Result<()> {
        Err(Error::database("simulated insert failure"))
    }

    async fn save_content(&self, content: &Content) -> Result<()> {
        self.0.save_content(content).await
    }

    async fn adjust_counter(&self, id: ContentId, counter: ContentCounter, delta: i64) -> Result<()> {
        self.0.adjust_counter(id, counter, delta).await
    }

    async fn purge_relations(&self, id: ContentId) -> Result<()> {
        self.0.purge_relations(id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.0.health_check().await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub media: Arc<RecordingStorage>,
    pub content: ContentService,
    pub social: SocialService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_feed(FeedConfig::default())
    }

    pub fn with_feed(feed: FeedConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(store.clone(), store, feed)
    }

    /// Harness whose content inserts always fail
    pub fn rejecting_inserts() -> Self {
        let store = Arc::new(MemoryStore::new());
        let contents = Arc::new(RejectingInserts(store.clone()));
        Self::build(store, contents, FeedConfig::default())
    }

    fn build(
        store: Arc<MemoryStore>,
        contents: Arc<dyn ContentRepository>,
        feed: FeedConfig,
    ) -> Self {
        let media = Arc::new(RecordingStorage::default());
        let content = ContentService::new(
            contents,
            store.clone(),
            media.clone(),
            ViewTrigger::new(store.clone()),
            feed.clone(),
        );
        let social = SocialService::new(store.clone(), store.clone(), feed);
        Self {
            store,
            media,
            content,
            social,
        }
    }

    pub async fn profile(&self, username: &str) -> Profile {
        self.social
            .create_profile(username, None, None)
            .await
            .unwrap()
    }

    /// Upload a public item and return its id
    pub async fn publish(
        &self,
        creator: ProfileId,
        title: &str,
        category: &str,
    ) -> streamhub::models::ContentId {
        self.content
            .create(
                creator,
                form(title, category),
                Some(video()),
                Some(image()),
            )
            .await
            .unwrap()
            .content
            .id
    }
}

pub fn form(title: &str, category: &str) -> NewContent {
    NewContent {
        title: Some(title.to_string()),
        description: Some(format!("All about {} #demo", title)),
        category: Some(category.to_string()),
        tags: Some("rust, video".to_string()),
        visibility: None,
        age_restriction: None,
    }
}

pub fn video() -> MediaUpload {
    MediaUpload {
        kind: MediaKind::Video,
        file_name: "clip.mp4".into(),
        content_type: Some("video/mp4".into()),
        data: Bytes::from_static(b"fake video bytes"),
    }
}

pub fn image() -> MediaUpload {
    MediaUpload {
        kind: MediaKind::Image,
        file_name: "thumb.jpg".into(),
        content_type: Some("image/jpeg".into()),
        data: Bytes::from_static(b"fake image bytes"),
    }
}
