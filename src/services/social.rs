//! Social operations: interactions, connections, comments, history, channels,
//! notifications

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::feed::pagination::paginate;
use crate::feed::{FeedItem, FeedPipeline, Page, PageRequest, Predicate, SortKey};
use crate::models::{
    Comment, CommentId, Connection, ConnectionKind, Content, ContentId,
    Interaction, InteractionKind, Notification, NotificationId, NotificationKind, Profile,
    ProfileId, MAX_COMMENT_LENGTH,
};
use crate::store::{ContentCounter, ContentRepository, ProfileCounter, SocialRepository};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Interaction state after a toggle
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    #[serde(rename = "interactionType")]
    pub kind: InteractionKind,
    pub active: bool,
}

/// Connection state after a toggle; `None` means no connection remains
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connection_type: Option<ConnectionKind>,
}

/// Public channel view of a profile
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
}

#[derive(Clone)]
pub struct SocialService {
    contents: Arc<dyn ContentRepository>,
    social: Arc<dyn SocialRepository>,
    feed: FeedConfig,
}

impl SocialService {
    pub fn new(
        contents: Arc<dyn ContentRepository>,
        social: Arc<dyn SocialRepository>,
        feed: FeedConfig,
    ) -> Self {
        Self {
            contents,
            social,
            feed,
        }
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Like, dislike, save or share toggle. Views are only recorded by reads.
    #[instrument(skip(self))]
    pub async fn toggle_interaction(
        &self,
        actor: ProfileId,
        content_id: ContentId,
        kind: InteractionKind,
    ) -> Result<InteractionState> {
        if kind == InteractionKind::View {
            return Err(Error::invalid_field(
                "interactionType",
                "views are recorded when content is opened",
            ));
        }
        let content = self.visible_content(content_id, Some(actor)).await?;

        let active = self
            .social
            .toggle_interaction(Interaction {
                profile_id: actor,
                content_id,
                kind,
            })
            .await?;

        if let Some(counter) = ContentCounter::for_interaction(kind) {
            let delta = if active { 1 } else { -1 };
            if let Err(e) = self.contents.adjust_counter(content_id, counter, delta).await {
                warn!(content_id = %content_id, error = %e, "Failed to update interaction counter");
            }
        }

        if active && kind == InteractionKind::Like && content.creator_id != actor {
            self.notify(
                content.creator_id,
                Some(actor),
                NotificationKind::Like,
                Some(content_id),
                format!("liked \"{}\"", content.title),
            )
            .await;
        }

        debug!(active, "Interaction toggled");
        Ok(InteractionState { kind, active })
    }

    /// Content the actor liked, most recently liked first. Items that are no
    /// longer visible do not count towards the page totals.
    pub async fn liked(&self, actor: ProfileId, page: PageRequest) -> Result<Page<FeedItem>> {
        let ids = self
            .social
            .interacted_content_ids(actor, InteractionKind::Like)
            .await?;
        let items = self.visible_in_order(actor, &ids).await?;
        Ok(paginate(items, page))
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Toggle a follow, block or mute. Asking for the kind already in place
    /// removes it; asking for another kind replaces it.
    #[instrument(skip(self))]
    pub async fn toggle_connection(
        &self,
        actor: ProfileId,
        target: ProfileId,
        kind: ConnectionKind,
    ) -> Result<ConnectionState> {
        if actor == target {
            return Err(Error::invalid_field(
                "profileId",
                "cannot connect to your own profile",
            ));
        }
        if self.social.find_profile(target).await?.is_none() {
            return Err(Error::not_found("profile", target));
        }

        let previous = self.social.find_connection(actor, target).await?;
        let current = if previous == Some(kind) {
            self.social.remove_connection(actor, target).await?;
            None
        } else {
            self.social
                .put_connection(Connection {
                    follower_id: actor,
                    following_id: target,
                    kind,
                })
                .await?;
            Some(kind)
        };

        let was_following = previous == Some(ConnectionKind::Follow);
        let is_following = current == Some(ConnectionKind::Follow);
        if was_following != is_following {
            let delta = if is_following { 1 } else { -1 };
            self.bump(target, ProfileCounter::Followers, delta).await;
            self.bump(actor, ProfileCounter::Following, delta).await;
        }
        if is_following && !was_following {
            self.notify(target, Some(actor), NotificationKind::Follow, None, "started following you".into())
                .await;
        }

        Ok(ConnectionState {
            connection_type: current,
        })
    }

    /// Register a profile under a unique handle
    #[instrument(skip(self))]
    pub async fn create_profile(
        &self,
        username: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Profile> {
        let username = Profile::validate_username(username)?;
        let display_name = match display_name.map(str::trim).filter(|d| !d.is_empty()) {
            Some(name) if name.chars().count() > 50 => {
                return Err(Error::invalid_field(
                    "displayName",
                    "display name must be at most 50 characters",
                ))
            }
            Some(name) => name.to_string(),
            None => username.clone(),
        };

        let profile = Profile {
            id: ProfileId::new(),
            username,
            display_name,
            avatar_url: avatar_url
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from),
            is_verified: false,
            followers: 0,
            following: 0,
            content_count: 0,
            created_at: Utc::now(),
        };
        self.social.insert_profile(&profile).await?;
        info!(profile_id = %profile.id, username = %profile.username, "👤 Profile created");
        Ok(profile)
    }

    /// Channel page, with `isSubscribed` for a known viewer
    pub async fn channel(&self, username: &str, viewer: Option<ProfileId>) -> Result<Channel> {
        let profile = self
            .social
            .find_profile_by_username(&username.trim().to_lowercase())
            .await?
            .ok_or_else(|| Error::not_found("profile", username))?;

        let is_subscribed = match viewer {
            Some(viewer) if viewer != profile.id => Some(
                self.social.find_connection(viewer, profile.id).await?
                    == Some(ConnectionKind::Follow),
            ),
            Some(_) => Some(false),
            None => None,
        };

        Ok(Channel {
            profile,
            is_subscribed,
        })
    }

    // ========================================================================
    // Watch history
    // ========================================================================

    /// Most recently watched first. Items that were removed or hidden since
    /// are left out of the page.
    pub async fn history(&self, actor: ProfileId, page: PageRequest) -> Result<Page<FeedItem>> {
        let ids = self.social.watch_history(actor, page).await?;
        let items = self.visible_in_order(actor, &ids.items).await?;

        Ok(Page {
            items,
            current_page: ids.current_page,
            total_pages: ids.total_pages,
            total_items: ids.total_items,
            has_next_page: ids.has_next_page,
            has_prev_page: ids.has_prev_page,
            limit: ids.limit,
        })
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub async fn comments(
        &self,
        content_id: ContentId,
        parent: Option<CommentId>,
        viewer: Option<ProfileId>,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        self.visible_content(content_id, viewer).await?;
        self.social.list_comments(content_id, parent, page).await
    }

    #[instrument(skip(self, body))]
    pub async fn add_comment(
        &self,
        actor: ProfileId,
        content_id: ContentId,
        body: &str,
        parent_id: Option<CommentId>,
    ) -> Result<Comment> {
        let body = body.trim();
        if body.is_empty() || body.chars().count() > MAX_COMMENT_LENGTH {
            return Err(Error::invalid_field(
                "content",
                format!("comment must be 1-{} characters", MAX_COMMENT_LENGTH),
            ));
        }
        let content = self.visible_content(content_id, Some(actor)).await?;

        let parent = match parent_id {
            Some(id) => Some(
                self.social
                    .find_comment(id)
                    .await?
                    .filter(|c| c.content_id == content_id && !c.is_deleted)
                    .ok_or_else(|| Error::not_found("comment", id))?,
            ),
            None => None,
        };

        let comment = Comment {
            id: CommentId::new(),
            content_id,
            author_id: actor,
            parent_id,
            thread_level: Comment::reply_level(parent.as_ref())?,
            body: body.to_string(),
            likes: 0,
            replies: 0,
            is_edited: false,
            is_deleted: false,
            is_reported: false,
            created_at: Utc::now(),
        };
        self.social.insert_comment(&comment).await?;

        if let Err(e) = self
            .contents
            .adjust_counter(content_id, ContentCounter::Comments, 1)
            .await
        {
            warn!(content_id = %content_id, error = %e, "Failed to bump comment count");
        }
        if let Some(parent) = &parent {
            if let Err(e) = self.social.adjust_comment_replies(parent.id, 1).await {
                warn!(comment_id = %parent.id, error = %e, "Failed to bump reply count");
            }
        }
        if content.creator_id != actor {
            self.notify(
                content.creator_id,
                Some(actor),
                NotificationKind::Comment,
                Some(content_id),
                format!("commented on \"{}\"", content.title),
            )
            .await;
        }

        Ok(comment)
    }

    /// Soft-delete the actor's own comment
    pub async fn delete_comment(&self, actor: ProfileId, id: CommentId) -> Result<()> {
        let comment = self
            .social
            .find_comment(id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| Error::not_found("comment", id))?;
        if comment.author_id != actor {
            return Err(Error::forbidden("You can only delete your own comments"));
        }

        self.social.mark_comment_deleted(id).await?;
        if let Err(e) = self
            .contents
            .adjust_counter(comment.content_id, ContentCounter::Comments, -1)
            .await
        {
            warn!(content_id = %comment.content_id, error = %e, "Failed to decrement comment count");
        }
        if let Some(parent) = comment.parent_id {
            if let Err(e) = self.social.adjust_comment_replies(parent, -1).await {
                warn!(comment_id = %parent, error = %e, "Failed to decrement reply count");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    pub async fn notifications(
        &self,
        actor: ProfileId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        self.social.list_notifications(actor, page).await
    }

    pub async fn mark_read(&self, actor: ProfileId, id: NotificationId) -> Result<()> {
        if self.social.mark_notification_read(id, actor).await? {
            Ok(())
        } else {
            Err(Error::not_found("notification", id))
        }
    }

    /// Page size bounds for list endpoints
    pub fn list_page(&self, page: Option<&str>, limit: Option<&str>) -> Result<PageRequest> {
        PageRequest::parse(
            page,
            limit,
            self.feed.default_list_page_size,
            self.feed.max_page_size,
        )
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Feed items for `ids` that `actor` may still see, in the order given
    async fn visible_in_order(&self, actor: ProfileId, ids: &[ContentId]) -> Result<Vec<FeedItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let order: HashMap<ContentId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let pipeline = FeedPipeline::with_keys(
            Predicate::visible_ids(ids.to_vec()),
            vec![SortKey::Id],
            None,
            Some(actor),
        );
        let lookup = PageRequest {
            page: 1,
            limit: ids.len() as i64,
        };
        let mut items = Vec::new();
        for item in self.contents.run_feed(&pipeline, lookup).await?.items {
            if super::can_view(self.social.as_ref(), &item.content, Some(actor)).await? {
                items.push(item);
            }
        }
        items.sort_by_key(|item| order.get(&item.content.id).copied().unwrap_or(usize::MAX));
        Ok(items)
    }

    async fn visible_content(&self, id: ContentId, viewer: Option<ProfileId>) -> Result<Content> {
        let content = self
            .contents
            .find_content(id)
            .await?
            .ok_or_else(|| Error::not_found("content", id))?;
        if !super::can_view(self.social.as_ref(), &content, viewer).await? {
            return Err(Error::not_found("content", id));
        }
        Ok(content)
    }

    async fn bump(&self, profile: ProfileId, counter: ProfileCounter, delta: i64) {
        if let Err(e) = self.social.adjust_profile_counter(profile, counter, delta).await {
            warn!(profile_id = %profile, ?counter, error = %e, "Failed to update profile counter");
        }
    }

    /// Notifications are best-effort
    async fn notify(
        &self,
        recipient: ProfileId,
        sender: Option<ProfileId>,
        kind: NotificationKind,
        related_content: Option<ContentId>,
        message: String,
    ) {
        let notification = Notification {
            id: NotificationId::new(),
            recipient_id: recipient,
            sender_id: sender,
            kind,
            related_content,
            message,
            is_read: false,
            created_at: Utc::now(),
        };
        if let Err(e) = self.social.insert_notification(&notification).await {
            warn!(recipient = %recipient, error = %e, "Failed to store notification");
        }
    }
}
