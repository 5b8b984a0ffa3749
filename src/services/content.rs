//! Content operations: feed, single reads, upload, edit, publish toggle, delete

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::feed::{
    Condition, CreatorSummary, FeedFilter, FeedItem, FeedPipeline, Page, PageRequest, Predicate,
    SortKey, SortMode,
};
use crate::media::{self, MediaKind, MediaStorage, MediaUpload};
use crate::models::{
    normalize_tags, slugify, AgeRestriction, Category, Content, ContentId, ContentStatus,
    Metrics, Profile, ProfileId, Visibility,
};
use crate::store::{ContentRepository, ProfileCounter, SocialRepository};
use crate::views::ViewTrigger;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const FEED_REQUESTS_METRIC: &str = "streamhub_feed_requests_total";

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Raw feed query parameters
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub user_id: Option<String>,
    pub query: Option<String>,
}

/// Text fields of an upload form
#[derive(Debug, Clone, Default)]
pub struct NewContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub visibility: Option<String>,
    pub age_restriction: Option<String>,
}

/// Edit form. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub visibility: Option<String>,
    pub age_restriction: Option<String>,
    pub status: Option<String>,
}

/// Trimmed, length-checked text
fn clean_text(field: &'static str, raw: Option<&str>, max: usize) -> Result<String> {
    let value = raw.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(Error::invalid_field(field, format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(Error::invalid_field(
            field,
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(value.to_string())
}

fn parse_or<T: std::str::FromStr<Err = Error>>(raw: Option<&str>, default: T) -> Result<T> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value.parse(),
        None => Ok(default),
    }
}

#[derive(Clone)]
pub struct ContentService {
    contents: Arc<dyn ContentRepository>,
    social: Arc<dyn SocialRepository>,
    media: Arc<dyn MediaStorage>,
    views: ViewTrigger,
    feed: FeedConfig,
}

impl ContentService {
    pub fn new(
        contents: Arc<dyn ContentRepository>,
        social: Arc<dyn SocialRepository>,
        media: Arc<dyn MediaStorage>,
        views: ViewTrigger,
        feed: FeedConfig,
    ) -> Self {
        Self {
            contents,
            social,
            media,
            views,
            feed,
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

    /// The public feed
    #[instrument(skip(self, query), fields(sort = ?query.sort_by, category = ?query.category))]
    pub async fn feed(&self, query: &FeedQuery, viewer: Option<ProfileId>) -> Result<Page<FeedItem>> {
        let page = PageRequest::parse(
            query.page.as_deref(),
            query.limit.as_deref(),
            self.feed.default_feed_page_size,
            self.feed.max_page_size,
        )?;
        let predicate = Predicate::feed(&FeedFilter {
            category: query.category.as_deref(),
            user_id: query.user_id.as_deref(),
            query: query.query.as_deref(),
        })?;
        let sort = SortMode::parse(query.sort_by.as_deref());
        let pipeline =
            FeedPipeline::build(predicate, sort, self.feed.trending_weights, viewer);

        metrics::counter!(FEED_REQUESTS_METRIC, "sort" => format!("{:?}", sort).to_lowercase())
            .increment(1);
        self.contents.run_feed(&pipeline, page).await
    }

    /// One item with creator and viewer flags. A view is recorded in the
    /// background once the item is resolved.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: ContentId, viewer: Option<ProfileId>) -> Result<FeedItem> {
        let predicate = Predicate::new()
            .and(Condition::IdIn(vec![id]))
            .and(Condition::StatusIsNot(ContentStatus::Removed));
        let pipeline = FeedPipeline::with_keys(predicate, vec![SortKey::Id], None, viewer);

        let item = self
            .contents
            .run_feed(&pipeline, PageRequest { page: 1, limit: 1 })
            .await?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("content", id))?;
        if !super::can_view(self.social.as_ref(), &item.content, viewer).await? {
            return Err(Error::not_found("content", id));
        }

        self.views.fire(id, viewer);
        Ok(item)
    }

    /// The actor's own items, newest first, optionally narrowed by status
    pub async fn list_mine(
        &self,
        actor: ProfileId,
        page: PageRequest,
        status: Option<&str>,
    ) -> Result<Page<FeedItem>> {
        let predicate = Predicate::owned_by(actor, status)?;
        let pipeline = FeedPipeline::with_keys(
            predicate,
            vec![SortKey::CreatedAt, SortKey::Id],
            None,
            Some(actor),
        );
        self.contents.run_feed(&pipeline, page).await
    }

    /// Validate, store both files, then create the record. Nothing is written
    /// unless both uploads succeeded.
    #[instrument(skip(self, form, primary, thumbnail))]
    pub async fn create(
        &self,
        actor: ProfileId,
        form: NewContent,
        primary: Option<MediaUpload>,
        thumbnail: Option<MediaUpload>,
    ) -> Result<FeedItem> {
        let title = clean_text("title", form.title.as_deref(), MAX_TITLE_LENGTH)?;
        let description =
            clean_text("description", form.description.as_deref(), MAX_DESCRIPTION_LENGTH)?;
        let category: Category = match form.category.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.parse()?,
            _ => return Err(Error::invalid_field("category", "category is required")),
        };
        let visibility = parse_or(form.visibility.as_deref(), Visibility::default())?;
        let age_restriction = parse_or(form.age_restriction.as_deref(), AgeRestriction::default())?;

        let (primary, thumbnail) = match (primary, thumbnail) {
            (Some(primary), Some(thumbnail)) => (primary, thumbnail),
            _ => {
                return Err(Error::validation(
                    "Both media file and thumbnail are required",
                ))
            }
        };

        let creator = self.require_profile(actor).await?;

        let files = media::upload_pair(self.media.as_ref(), primary, thumbnail).await?;

        let now = Utc::now();
        let id = ContentId::new();
        let content = Content {
            id,
            creator_id: actor,
            slug: slugify(&title, id),
            tags: normalize_tags(form.tags.as_deref(), &description),
            title,
            description,
            category,
            visibility,
            status: ContentStatus::Published,
            age_restriction,
            media: files,
            metrics: Metrics::default(),
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.contents.insert_content(&content).await {
            // The record never existed, so neither may its files
            tokio::join!(
                media::discard(self.media.as_ref(), &content.media.primary.public_id, MediaKind::Video),
                media::discard(self.media.as_ref(), &content.media.thumbnail.public_id, MediaKind::Image),
            );
            return Err(e);
        }

        if let Err(e) = self
            .social
            .adjust_profile_counter(actor, ProfileCounter::ContentCount, 1)
            .await
        {
            warn!(profile_id = %actor, error = %e, "Failed to bump content count");
        }

        info!(content_id = %content.id, creator = %actor, "📼 Content published");
        Ok(FeedItem::new(content, CreatorSummary::from(&creator)))
    }

    /// Apply an edit. A new thumbnail replaces the old one, which is deleted
    /// after the record points at its replacement.
    #[instrument(skip(self, patch, thumbnail))]
    pub async fn update(
        &self,
        actor: ProfileId,
        id: ContentId,
        patch: ContentPatch,
        thumbnail: Option<MediaUpload>,
    ) -> Result<Content> {
        let mut content = self.owned(actor, id).await?;

        if patch.title.is_some() {
            content.title = clean_text("title", patch.title.as_deref(), MAX_TITLE_LENGTH)?;
        }
        if patch.description.is_some() {
            content.description = clean_text(
                "description",
                patch.description.as_deref(),
                MAX_DESCRIPTION_LENGTH,
            )?;
        }
        content.category = parse_or(patch.category.as_deref(), content.category)?;
        content.visibility = parse_or(patch.visibility.as_deref(), content.visibility)?;
        content.age_restriction =
            parse_or(patch.age_restriction.as_deref(), content.age_restriction)?;
        if patch.tags.is_some() {
            content.tags = normalize_tags(patch.tags.as_deref(), &content.description);
        }
        if let Some(status) = patch.status.as_deref() {
            let next: ContentStatus = status.parse()?;
            if next != content.status {
                self.move_to(&mut content, next)?;
            }
        }

        let replaced = match thumbnail {
            Some(upload) => {
                let stored = self.media.upload(upload).await?;
                Some(std::mem::replace(&mut content.media.thumbnail, stored))
            }
            None => None,
        };

        content.updated_at = Utc::now();
        if let Err(e) = self.contents.save_content(&content).await {
            if replaced.is_some() {
                media::discard(
                    self.media.as_ref(),
                    &content.media.thumbnail.public_id,
                    MediaKind::Image,
                )
                .await;
            }
            return Err(e);
        }

        if let Some(old) = replaced {
            media::discard(self.media.as_ref(), &old.public_id, MediaKind::Image).await;
        }

        Ok(content)
    }

    /// Flip between published and archived
    pub async fn toggle_publish(&self, actor: ProfileId, id: ContentId) -> Result<Content> {
        let mut content = self.owned(actor, id).await?;
        let next = match content.status {
            ContentStatus::Published => ContentStatus::Archived,
            _ => ContentStatus::Published,
        };
        self.move_to(&mut content, next)?;
        content.updated_at = Utc::now();
        self.contents.save_content(&content).await?;
        info!(content_id = %id, status = %content.status, "Publish state toggled");
        Ok(content)
    }

    /// Remove an item. Its interactions and comments go with it; the stored
    /// files are deleted best-effort.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: ProfileId, id: ContentId) -> Result<()> {
        let mut content = self.owned(actor, id).await?;
        self.move_to(&mut content, ContentStatus::Removed)?;
        content.updated_at = Utc::now();
        self.contents.save_content(&content).await?;
        self.contents.purge_relations(id).await?;

        tokio::join!(
            media::discard(self.media.as_ref(), &content.media.primary.public_id, MediaKind::Video),
            media::discard(self.media.as_ref(), &content.media.thumbnail.public_id, MediaKind::Image),
        );

        if let Err(e) = self
            .social
            .adjust_profile_counter(actor, ProfileCounter::ContentCount, -1)
            .await
        {
            warn!(profile_id = %actor, error = %e, "Failed to decrement content count");
        }

        info!(content_id = %id, "🗑️ Content removed");
        Ok(())
    }

    fn move_to(&self, content: &mut Content, next: ContentStatus) -> Result<()> {
        content.status = content.status.transition(next)?;
        if next == ContentStatus::Published && content.published_at.is_none() {
            content.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn require_profile(&self, actor: ProfileId) -> Result<Profile> {
        self.social
            .find_profile(actor)
            .await?
            .ok_or_else(|| Error::unauthorized("unknown profile"))
    }

    /// Load a live item and check the actor owns it
    async fn owned(&self, actor: ProfileId, id: ContentId) -> Result<Content> {
        let content = self
            .contents
            .find_content(id)
            .await?
            .filter(|c| c.status != ContentStatus::Removed)
            .ok_or_else(|| Error::not_found("content", id))?;
        if content.creator_id != actor {
            return Err(Error::forbidden("You can only change your own content"));
        }
        Ok(content)
    }
}
