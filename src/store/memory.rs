//! In-process store
//!
//! Interprets feed pipelines stage by stage over maps behind a tokio `RwLock`.
//! Backs the test suites and `STORE_BACKEND=memory` development runs.

use super::{ContentCounter, ContentRepository, ProfileCounter, SocialRepository};
use crate::error::{Error, Result};
use crate::feed::pagination::paginate;
use crate::feed::sort::{self, Ranked};
use crate::feed::{CreatorSummary, FeedItem, FeedPipeline, Page, PageRequest, Stage, ViewerFlags};
use crate::models::{
    Comment, CommentId, Connection, ConnectionKind, Content, ContentId, Interaction,
    InteractionKind, Notification, NotificationId, Profile, ProfileId,
};
use crate::views::ViewSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    profiles: HashMap<ProfileId, Profile>,
    contents: HashMap<ContentId, Content>,
    /// Each interaction with the sequence number it was created at
    interactions: HashMap<Interaction, u64>,
    next_sequence: u64,
    connections: HashMap<(ProfileId, ProfileId), ConnectionKind>,
    comments: HashMap<CommentId, Comment>,
    history: HashMap<ProfileId, Vec<(ContentId, DateTime<Utc>)>>,
    notifications: Vec<Notification>,
}

impl State {
    fn viewer_flags(&self, viewer: ProfileId, content: ContentId) -> ViewerFlags {
        let has = |kind| {
            self.interactions.contains_key(&Interaction {
                profile_id: viewer,
                content_id: content,
                kind,
            })
        };
        ViewerFlags {
            is_liked: has(InteractionKind::Like),
            is_saved: has(InteractionKind::Save),
        }
    }
}

/// Row moving through the pipeline
struct Row {
    content: Content,
    score: Option<f64>,
    creator: Option<CreatorSummary>,
    flags: Option<ViewerFlags>,
}

impl Ranked for Row {
    fn content(&self) -> &Content {
        &self.content
    }

    fn trending_score(&self) -> Option<f64> {
        self.score
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn adjust(value: &mut i64, delta: i64) {
    *value = (*value + delta).max(0);
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn run_feed(&self, pipeline: &FeedPipeline, page: PageRequest) -> Result<Page<FeedItem>> {
        if !pipeline.joins_creator() {
            return Err(Error::Other(anyhow::anyhow!(
                "feed pipelines must include a creator lookup"
            )));
        }

        let state = self.state.read().await;
        let mut rows: Vec<Row> = state
            .contents
            .values()
            .map(|content| Row {
                content: content.clone(),
                score: None,
                creator: None,
                flags: None,
            })
            .collect();

        for stage in pipeline.stages() {
            match stage {
                Stage::Match(predicate) => rows.retain(|row| predicate.matches(&row.content)),
                Stage::AddTrendingScore(weights) => {
                    for row in rows.iter_mut() {
                        row.score = Some(weights.score(&row.content.metrics));
                    }
                }
                Stage::Sort(keys) => rows.sort_by(|a, b| sort::compare(keys, a, b)),
                Stage::LookupCreator => {
                    rows.retain_mut(|row| match state.profiles.get(&row.content.creator_id) {
                        Some(profile) => {
                            row.creator = Some(CreatorSummary::from(profile));
                            true
                        }
                        None => false,
                    });
                }
                Stage::LookupViewerFlags { viewer } => {
                    for row in rows.iter_mut() {
                        row.flags = Some(state.viewer_flags(*viewer, row.content.id));
                    }
                }
            }
        }

        let items: Vec<FeedItem> = rows
            .into_iter()
            .filter_map(|row| {
                let creator = row.creator?;
                let mut item = FeedItem::new(row.content, creator);
                item.trending_score = row.score;
                Some(match row.flags {
                    Some(flags) => item.with_viewer_flags(flags),
                    None => item,
                })
            })
            .collect();

        debug!(total = items.len(), page = page.page, "Memory feed evaluated");
        Ok(paginate(items, page))
    }

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>> {
        Ok(self.state.read().await.contents.get(&id).cloned())
    }

    async fn insert_content(&self, content: &Content) -> Result<()> {
        let mut state = self.state.write().await;
        if state.contents.values().any(|c| c.slug == content.slug) {
            return Err(Error::ConstraintViolation {
                message: "Constraint 'contents_slug_key' violated".into(),
            });
        }
        state.contents.insert(content.id, content.clone());
        Ok(())
    }

    async fn save_content(&self, content: &Content) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .contents
            .get_mut(&content.id)
            .ok_or_else(|| Error::not_found("content", content.id))?;

        let metrics = stored.metrics;
        *stored = content.clone();
        stored.metrics = metrics;
        Ok(())
    }

    async fn adjust_counter(&self, id: ContentId, counter: ContentCounter, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let content = state
            .contents
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("content", id))?;

        let metrics = &mut content.metrics;
        let value = match counter {
            ContentCounter::Views => &mut metrics.views,
            ContentCounter::Likes => &mut metrics.likes,
            ContentCounter::Dislikes => &mut metrics.dislikes,
            ContentCounter::Shares => &mut metrics.shares,
            ContentCounter::Comments => &mut metrics.comments,
        };
        adjust(value, delta);
        Ok(())
    }

    async fn purge_relations(&self, id: ContentId) -> Result<()> {
        let mut state = self.state.write().await;
        state.interactions.retain(|i, _| i.content_id != id);
        state.comments.retain(|_, c| c.content_id != id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SocialRepository for MemoryStore {
    async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        let mut state = self.state.write().await;
        if state.profiles.values().any(|p| p.username == profile.username) {
            return Err(Error::Conflict {
                message: format!("username '{}' is taken", profile.username).into(),
            });
        }
        state.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(&id).cloned())
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let username = username.to_lowercase();
        let state = self.state.read().await;
        Ok(state.profiles.values().find(|p| p.username == username).cloned())
    }

    async fn adjust_profile_counter(
        &self,
        id: ProfileId,
        counter: ProfileCounter,
        delta: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let profile = state
            .profiles
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("profile", id))?;
        let value = match counter {
            ProfileCounter::Followers => &mut profile.followers,
            ProfileCounter::Following => &mut profile.following,
            ProfileCounter::ContentCount => &mut profile.content_count,
        };
        adjust(value, delta);
        Ok(())
    }

    async fn toggle_interaction(&self, interaction: Interaction) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.interactions.remove(&interaction).is_some() {
            Ok(false)
        } else {
            state.next_sequence += 1;
            let sequence = state.next_sequence;
            state.interactions.insert(interaction, sequence);
            Ok(true)
        }
    }

    async fn has_interaction(&self, interaction: Interaction) -> Result<bool> {
        Ok(self.state.read().await.interactions.contains_key(&interaction))
    }

    async fn interacted_content_ids(
        &self,
        profile: ProfileId,
        kind: InteractionKind,
    ) -> Result<Vec<ContentId>> {
        let state = self.state.read().await;
        let mut matching: Vec<_> = state
            .interactions
            .iter()
            .filter(|(i, _)| i.profile_id == profile && i.kind == kind)
            .map(|(i, sequence)| (*sequence, i.content_id))
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matching.into_iter().map(|(_, id)| id).collect())
    }

    async fn find_connection(
        &self,
        follower: ProfileId,
        following: ProfileId,
    ) -> Result<Option<ConnectionKind>> {
        let state = self.state.read().await;
        Ok(state.connections.get(&(follower, following)).copied())
    }

    async fn put_connection(&self, connection: Connection) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .connections
            .insert((connection.follower_id, connection.following_id), connection.kind);
        Ok(())
    }

    async fn remove_connection(&self, follower: ProfileId, following: ProfileId) -> Result<()> {
        self.state
            .write()
            .await
            .connections
            .remove(&(follower, following));
        Ok(())
    }

    async fn record_watch(&self, profile: ProfileId, content: ContentId) -> Result<()> {
        let mut state = self.state.write().await;
        let entries = state.history.entry(profile).or_default();
        entries.retain(|(id, _)| *id != content);
        entries.insert(0, (content, Utc::now()));
        Ok(())
    }

    async fn watch_history(&self, profile: ProfileId, page: PageRequest) -> Result<Page<ContentId>> {
        let state = self.state.read().await;
        let ids: Vec<ContentId> = state
            .history
            .get(&profile)
            .map(|entries| entries.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default();
        Ok(paginate(ids, page))
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        let mut state = self.state.write().await;
        state.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        Ok(self.state.read().await.comments.get(&id).cloned())
    }

    async fn list_comments(
        &self,
        content: ContentId,
        parent: Option<CommentId>,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.content_id == content && c.parent_id == parent && !c.is_deleted)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(comments, page))
    }

    async fn mark_comment_deleted(&self, id: CommentId) -> Result<()> {
        let mut state = self.state.write().await;
        let comment = state
            .comments
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("comment", id))?;
        comment.is_deleted = true;
        Ok(())
    }

    async fn adjust_comment_replies(&self, id: CommentId, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(comment) = state.comments.get_mut(&id) {
            adjust(&mut comment.replies, delta);
        }
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient: ProfileId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(notifications, page))
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient: ProfileId,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ViewSink for MemoryStore {
    async fn record_view(&self, content: ContentId, viewer: Option<ProfileId>) -> Result<()> {
        self.adjust_counter(content, ContentCounter::Views, 1).await?;
        if let Some(viewer) = viewer {
            self.record_watch(viewer, content).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedFilter, Predicate, SortMode, TrendingWeights};
    use crate::models::*;
    use chrono::Duration;

    fn profile(username: &str) -> Profile {
        Profile {
            id: ProfileId::new(),
            username: username.into(),
            display_name: username.to_uppercase(),
            avatar_url: None,
            is_verified: false,
            followers: 0,
            following: 0,
            content_count: 0,
            created_at: Utc::now(),
        }
    }

    fn content(creator: ProfileId, title: &str, age_mins: i64, metrics: Metrics) -> Content {
        let at = Utc::now() - Duration::minutes(age_mins);
        let asset = MediaAsset {
            url: format!("https://cdn.example/{}.mp4", title),
            public_id: title.into(),
            format: None,
            duration_secs: None,
            bytes: None,
        };
        let id = ContentId::new();
        Content {
            id,
            creator_id: creator,
            title: title.into(),
            description: format!("about {}", title),
            slug: slugify(title, id),
            category: Category::Technology,
            visibility: Visibility::Public,
            status: ContentStatus::Published,
            age_restriction: AgeRestriction::AllAges,
            tags: vec![],
            media: MediaFiles {
                primary: asset.clone(),
                thumbnail: asset,
            },
            metrics,
            published_at: Some(at),
            created_at: at,
            updated_at: at,
        }
    }

    fn feed(sort: SortMode, viewer: Option<ProfileId>) -> FeedPipeline {
        FeedPipeline::build(
            Predicate::feed(&FeedFilter::default()).unwrap(),
            sort,
            TrendingWeights::default(),
            viewer,
        )
    }

    #[tokio::test]
    async fn test_trending_orders_by_score() {
        let store = MemoryStore::new();
        let maker = profile("maker");
        store.insert_profile(&maker).await.unwrap();

        let low = content(
            maker.id,
            "low",
            1,
            Metrics { views: 100, likes: 10, comments: 5, shares: 2, ..Default::default() },
        );
        let high = content(
            maker.id,
            "high",
            60,
            Metrics { views: 50, likes: 20, comments: 10, shares: 10, ..Default::default() },
        );
        store.insert_content(&low).await.unwrap();
        store.insert_content(&high).await.unwrap();

        let page = store
            .run_feed(&feed(SortMode::Trending, None), PageRequest::new(1, 10, 100).unwrap())
            .await
            .unwrap();
        let titles: Vec<_> = page.items.iter().map(|i| i.content.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "low"]);
        assert_eq!(page.items[0].trending_score, Some(125.0));

        let page = store
            .run_feed(&feed(SortMode::Latest, None), PageRequest::new(1, 10, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.items[0].content.title, "low");
        assert!(page.items[0].trending_score.is_none());
    }

    #[tokio::test]
    async fn test_orphaned_content_is_dropped() {
        let store = MemoryStore::new();
        let maker = profile("maker");
        store.insert_profile(&maker).await.unwrap();
        store
            .insert_content(&content(maker.id, "kept", 1, Metrics::default()))
            .await
            .unwrap();
        store
            .insert_content(&content(ProfileId::new(), "orphan", 1, Metrics::default()))
            .await
            .unwrap();

        let page = store
            .run_feed(&feed(SortMode::Latest, None), PageRequest::new(1, 10, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].content.title, "kept");
    }

    #[tokio::test]
    async fn test_viewer_flags() {
        let store = MemoryStore::new();
        let maker = profile("maker");
        let viewer = profile("viewer");
        store.insert_profile(&maker).await.unwrap();
        store.insert_profile(&viewer).await.unwrap();
        let item = content(maker.id, "clip", 1, Metrics::default());
        store.insert_content(&item).await.unwrap();

        store
            .toggle_interaction(Interaction {
                profile_id: viewer.id,
                content_id: item.id,
                kind: InteractionKind::Save,
            })
            .await
            .unwrap();

        let page = store
            .run_feed(&feed(SortMode::Latest, Some(viewer.id)), PageRequest::new(1, 10, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.items[0].is_liked, Some(false));
        assert_eq!(page.items[0].is_saved, Some(true));
    }

    #[tokio::test]
    async fn test_toggle_interaction_twice_restores() {
        let store = MemoryStore::new();
        let interaction = Interaction {
            profile_id: ProfileId::new(),
            content_id: ContentId::new(),
            kind: InteractionKind::Like,
        };
        assert!(store.toggle_interaction(interaction).await.unwrap());
        assert!(!store.toggle_interaction(interaction).await.unwrap());
        assert!(!store.has_interaction(interaction).await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_history_is_a_set() {
        let store = MemoryStore::new();
        let viewer = ProfileId::new();
        let (a, b) = (ContentId::new(), ContentId::new());

        store.record_watch(viewer, a).await.unwrap();
        store.record_watch(viewer, b).await.unwrap();
        store.record_watch(viewer, a).await.unwrap();

        let page = store
            .watch_history(viewer, PageRequest::new(1, 10, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.items, vec![a, b]);
    }

    #[tokio::test]
    async fn test_counters_never_negative() {
        let store = MemoryStore::new();
        let maker = profile("maker");
        store.insert_profile(&maker).await.unwrap();
        let item = content(maker.id, "clip", 1, Metrics::default());
        store.insert_content(&item).await.unwrap();

        store.adjust_counter(item.id, ContentCounter::Likes, -1).await.unwrap();
        store
            .adjust_profile_counter(maker.id, ProfileCounter::Followers, -3)
            .await
            .unwrap();

        assert_eq!(store.find_content(item.id).await.unwrap().unwrap().metrics.likes, 0);
        assert_eq!(store.find_profile(maker.id).await.unwrap().unwrap().followers, 0);
    }
}
