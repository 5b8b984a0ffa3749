//! Storage backends
//!
//! Services talk to storage only through [`ContentRepository`] and
//! [`SocialRepository`] (plus [`crate::views::ViewSink`] for the post-read side
//! effect). Two implementations exist:
//!
//! - [`PgStore`] renders a feed pipeline into one SQL statement
//! - [`MemoryStore`] interprets the same pipeline in process

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::Result;
use crate::feed::{FeedItem, FeedPipeline, Page, PageRequest};
use crate::models::{
    Comment, CommentId, Connection, ConnectionKind, Content, ContentId, Interaction,
    InteractionKind, Notification, NotificationId, Profile, ProfileId,
};
use async_trait::async_trait;

/// Denormalized counters on a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCounter {
    Views,
    Likes,
    Dislikes,
    Shares,
    Comments,
}

impl ContentCounter {
    pub fn column(self) -> &'static str {
        match self {
            ContentCounter::Views => "views",
            ContentCounter::Likes => "likes",
            ContentCounter::Dislikes => "dislikes",
            ContentCounter::Shares => "shares",
            ContentCounter::Comments => "comments_count",
        }
    }

    /// Counter kept in step with an interaction kind
    pub fn for_interaction(kind: InteractionKind) -> Option<Self> {
        match kind {
            InteractionKind::Like => Some(ContentCounter::Likes),
            InteractionKind::Dislike => Some(ContentCounter::Dislikes),
            InteractionKind::Share => Some(ContentCounter::Shares),
            InteractionKind::Save | InteractionKind::View => None,
        }
    }
}

/// Denormalized counters on a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileCounter {
    Followers,
    Following,
    ContentCount,
}

impl ProfileCounter {
    pub fn column(self) -> &'static str {
        match self {
            ProfileCounter::Followers => "followers",
            ProfileCounter::Following => "following",
            ProfileCounter::ContentCount => "content_count",
        }
    }
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Execute a feed pipeline and return one page of it
    async fn run_feed(&self, pipeline: &FeedPipeline, page: PageRequest) -> Result<Page<FeedItem>>;

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>>;

    async fn insert_content(&self, content: &Content) -> Result<()>;

    /// Persist editable fields and status. Counters are left alone.
    async fn save_content(&self, content: &Content) -> Result<()>;

    /// Add `delta` to a counter, never going below zero
    async fn adjust_counter(
        &self,
        id: ContentId,
        counter: ContentCounter,
        delta: i64,
    ) -> Result<()>;

    /// Drop interactions and comments keyed to a content item
    async fn purge_relations(&self, id: ContentId) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
pub trait SocialRepository: Send + Sync {
    // Profiles

    async fn insert_profile(&self, profile: &Profile) -> Result<()>;

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>>;

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>>;

    async fn adjust_profile_counter(
        &self,
        id: ProfileId,
        counter: ProfileCounter,
        delta: i64,
    ) -> Result<()>;

    // Interactions

    /// Create the interaction if absent, delete it if present. Returns whether it
    /// exists afterwards.
    async fn toggle_interaction(&self, interaction: Interaction) -> Result<bool>;

    async fn has_interaction(&self, interaction: Interaction) -> Result<bool>;

    /// Content ids the profile has an interaction of `kind` with, most recent first
    async fn interacted_content_ids(
        &self,
        profile: ProfileId,
        kind: InteractionKind,
    ) -> Result<Vec<ContentId>>;

    // Connections

    async fn find_connection(
        &self,
        follower: ProfileId,
        following: ProfileId,
    ) -> Result<Option<ConnectionKind>>;

    /// Insert or replace the connection for the pair
    async fn put_connection(&self, connection: Connection) -> Result<()>;

    async fn remove_connection(&self, follower: ProfileId, following: ProfileId) -> Result<()>;

    // Watch history

    /// Add to history, moving an existing entry to the front
    async fn record_watch(&self, profile: ProfileId, content: ContentId) -> Result<()>;

    /// History ids, most recently watched first
    async fn watch_history(&self, profile: ProfileId, page: PageRequest) -> Result<Page<ContentId>>;

    // Comments

    async fn insert_comment(&self, comment: &Comment) -> Result<()>;

    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>>;

    /// Live comments under `parent` (top level when `None`), newest first
    async fn list_comments(
        &self,
        content: ContentId,
        parent: Option<CommentId>,
        page: PageRequest,
    ) -> Result<Page<Comment>>;

    async fn mark_comment_deleted(&self, id: CommentId) -> Result<()>;

    async fn adjust_comment_replies(&self, id: CommentId, delta: i64) -> Result<()>;

    // Notifications

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    async fn list_notifications(
        &self,
        recipient: ProfileId,
        page: PageRequest,
    ) -> Result<Page<Notification>>;

    /// Returns false when no such notification belongs to `recipient`
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient: ProfileId,
    ) -> Result<bool>;
}
