//! PostgreSQL store
//!
//! A feed pipeline becomes a single statement:
//!
//! ```sql
//! WITH matched AS (SELECT c.*, creator columns FROM contents c JOIN profiles p ... WHERE ...),
//!      total AS (SELECT COUNT(*) AS total_items FROM matched)
//! SELECT total.total_items, page_rows.*
//! FROM total LEFT JOIN LATERAL (
//!     SELECT m.*, trending_score, is_liked, is_saved FROM matched m ORDER BY ... LIMIT .. OFFSET ..
//! ) page_rows ON TRUE
//! ```
//!
//! so the page and its total count come from one snapshot. A page past the end
//! still yields the single `total` row, with NULL page columns.

use super::{ContentCounter, ContentRepository, ProfileCounter, SocialRepository};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::feed::{
    Condition, CreatorSummary, FeedItem, FeedPipeline, Page, PageRequest, SortKey, ViewerFlags,
};
use crate::models::{
    Comment, CommentId, Connection, ConnectionKind, Content, ContentId, Interaction,
    InteractionKind, MediaAsset, MediaFiles, Metrics, Notification, NotificationId, Profile,
    ProfileId,
};
use crate::views::ViewSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{FromRow, QueryBuilder, Row};
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Parse a closed-enum column; bad stored text is a data error, not a client one
fn stored<T: FromStr>(column: &'static str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::Database {
        message: format!("unexpected {} value '{}' in store", column, raw).into(),
        source: None,
    })
}

#[derive(FromRow)]
struct ContentRow {
    id: Uuid,
    creator_id: Uuid,
    title: String,
    description: String,
    slug: String,
    category: String,
    visibility: String,
    status: String,
    age_restriction: String,
    tags: Vec<String>,
    media_url: String,
    media_public_id: String,
    media_format: Option<String>,
    media_duration_secs: Option<f64>,
    media_bytes: Option<i64>,
    thumbnail_url: String,
    thumbnail_public_id: String,
    views: i64,
    likes: i64,
    dislikes: i64,
    shares: i64,
    comments_count: i64,
    watch_time_secs: i64,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContentRow> for Content {
    type Error = Error;

    fn try_from(row: ContentRow) -> Result<Self> {
        Ok(Content {
            id: row.id.into(),
            creator_id: row.creator_id.into(),
            category: stored("category", &row.category)?,
            visibility: stored("visibility", &row.visibility)?,
            status: stored("status", &row.status)?,
            age_restriction: stored("age_restriction", &row.age_restriction)?,
            title: row.title,
            description: row.description,
            slug: row.slug,
            tags: row.tags,
            media: MediaFiles {
                primary: MediaAsset {
                    url: row.media_url,
                    public_id: row.media_public_id,
                    format: row.media_format,
                    duration_secs: row.media_duration_secs,
                    bytes: row.media_bytes,
                },
                thumbnail: MediaAsset {
                    url: row.thumbnail_url,
                    public_id: row.thumbnail_public_id,
                    format: None,
                    duration_secs: None,
                    bytes: None,
                },
            },
            metrics: Metrics {
                views: row.views,
                likes: row.likes,
                dislikes: row.dislikes,
                shares: row.shares,
                comments: row.comments_count,
                watch_time_secs: row.watch_time_secs,
            },
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    is_verified: bool,
    followers: i64,
    following: i64,
    content_count: i64,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id.into(),
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            is_verified: row.is_verified,
            followers: row.followers,
            following: row.following,
            content_count: row.content_count,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: Uuid,
    content_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    thread_level: i16,
    body: String,
    likes: i64,
    replies: i64,
    is_edited: bool,
    is_deleted: bool,
    is_reported: bool,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id.into(),
            content_id: row.content_id.into(),
            author_id: row.author_id.into(),
            parent_id: row.parent_id.map(CommentId::from),
            thread_level: row.thread_level,
            body: row.body,
            likes: row.likes,
            replies: row.replies,
            is_edited: row.is_edited,
            is_deleted: row.is_deleted,
            is_reported: row.is_reported,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    sender_id: Option<Uuid>,
    kind: String,
    related_content: Option<Uuid>,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: row.id.into(),
            recipient_id: row.recipient_id.into(),
            sender_id: row.sender_id.map(ProfileId::from),
            kind: stored("kind", &row.kind)?,
            related_content: row.related_content.map(ContentId::from),
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, username, display_name, avatar_url, is_verified, \
     followers, following, content_count, created_at";

const COMMENT_COLUMNS: &str = "id, content_id, author_id, parent_id, thread_level, body, \
     likes, replies, is_edited, is_deleted, is_reported, created_at";

// ============================================================================
// Feed rendering
// ============================================================================

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, condition: &Condition) {
    match condition {
        Condition::StatusIs(status) => {
            qb.push(" AND c.status = ").push_bind(status.as_str());
        }
        Condition::StatusIsNot(status) => {
            qb.push(" AND c.status <> ").push_bind(status.as_str());
        }
        Condition::VisibilityIn(allowed) => {
            let values: Vec<String> = allowed.iter().map(|v| v.as_str().to_string()).collect();
            qb.push(" AND c.visibility = ANY(").push_bind(values).push(")");
        }
        Condition::CategoryIs(category) => {
            qb.push(" AND c.category = ").push_bind(category.as_str());
        }
        Condition::CreatorIs(creator) => {
            qb.push(" AND c.creator_id = ").push_bind(creator.0);
        }
        Condition::IdIn(ids) => {
            let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
            qb.push(" AND c.id = ANY(").push_bind(ids).push(")");
        }
        Condition::TextSearch(query) => {
            let pattern = format!("%{}%", escape_like(query));
            qb.push(" AND (c.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

fn order_term(key: SortKey) -> &'static str {
    match key {
        SortKey::TrendingScore => "trending_score DESC",
        SortKey::PublishedAt => "m.published_at DESC NULLS LAST",
        SortKey::CreatedAt => "m.created_at DESC",
        SortKey::Views => "m.views DESC",
        SortKey::Likes => "m.likes DESC",
        SortKey::Id => "m.id DESC",
    }
}

/// Render a pipeline and page into one statement
fn feed_query(pipeline: &FeedPipeline, page: PageRequest) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "WITH matched AS (\
         SELECT c.*, p.username AS creator_username, p.display_name AS creator_display_name, \
         p.avatar_url AS creator_avatar_url, p.is_verified AS creator_is_verified, \
         p.followers AS creator_followers \
         FROM contents c JOIN profiles p ON p.id = c.creator_id WHERE TRUE",
    );
    for condition in pipeline.conditions() {
        push_condition(&mut qb, condition);
    }

    qb.push(
        "), total AS (SELECT COUNT(*) AS total_items FROM matched) \
         SELECT total.total_items, page_rows.* FROM total LEFT JOIN LATERAL (SELECT m.*, ",
    );

    match pipeline.trending_weights() {
        Some(w) => {
            qb.push("(")
                .push_bind(w.views)
                .push(" * m.views::float8 + ")
                .push_bind(w.likes)
                .push(" * m.likes::float8 + ")
                .push_bind(w.comments)
                .push(" * m.comments_count::float8 + ")
                .push_bind(w.shares)
                .push(" * m.shares::float8) AS trending_score");
        }
        None => {
            qb.push("NULL::float8 AS trending_score");
        }
    }

    match pipeline.viewer() {
        Some(viewer) => {
            for (kind, alias) in [
                (InteractionKind::Like, "is_liked"),
                (InteractionKind::Save, "is_saved"),
            ] {
                qb.push(", EXISTS (SELECT 1 FROM interactions i WHERE i.content_id = m.id AND i.profile_id = ")
                    .push_bind(viewer.0)
                    .push(" AND i.kind = ")
                    .push_bind(kind.as_str())
                    .push(") AS ")
                    .push(alias);
            }
        }
        None => {
            qb.push(", NULL::boolean AS is_liked, NULL::boolean AS is_saved");
        }
    }

    qb.push(" FROM matched m");
    let keys = pipeline.sort_keys();
    if !keys.is_empty() {
        qb.push(" ORDER BY ");
        let terms: Vec<&str> = keys.iter().copied().map(order_term).collect();
        qb.push(terms.join(", "));
    }
    qb.push(" LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset())
        .push(") page_rows ON TRUE");

    qb
}

fn feed_item(row: &PgRow) -> Result<Option<FeedItem>> {
    let id: Option<Uuid> = row.try_get("id")?;
    if id.is_none() {
        return Ok(None);
    }

    let content = Content::try_from(ContentRow::from_row(row)?)?;
    let creator = CreatorSummary {
        id: content.creator_id,
        username: row.try_get("creator_username")?,
        display_name: row.try_get("creator_display_name")?,
        avatar_url: row.try_get("creator_avatar_url")?,
        is_verified: row.try_get("creator_is_verified")?,
        followers: row.try_get("creator_followers")?,
    };

    let mut item = FeedItem::new(content, creator);
    item.trending_score = row.try_get("trending_score")?;
    let is_liked: Option<bool> = row.try_get("is_liked")?;
    let is_saved: Option<bool> = row.try_get("is_saved")?;
    if let (Some(is_liked), Some(is_saved)) = (is_liked, is_saved) {
        item = item.with_viewer_flags(ViewerFlags { is_liked, is_saved });
    }
    Ok(Some(item))
}

// ============================================================================
// Repositories
// ============================================================================

#[async_trait]
impl ContentRepository for PgStore {
    #[instrument(skip(self, pipeline), fields(page = page.page, limit = page.limit))]
    async fn run_feed(&self, pipeline: &FeedPipeline, page: PageRequest) -> Result<Page<FeedItem>> {
        if !pipeline.joins_creator() {
            return Err(Error::Other(anyhow::anyhow!(
                "feed pipelines must include a creator lookup"
            )));
        }

        let mut qb = feed_query(pipeline, page);
        let rows = qb.build().fetch_all(self.pool()).await?;

        let mut total = 0;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            total = row.try_get::<i64, _>("total_items")?;
            if let Some(item) = feed_item(row)? {
                items.push(item);
            }
        }

        debug!(total, returned = items.len(), "Feed query executed");
        Ok(Page::new(items, total, page))
    }

    async fn find_content(&self, id: ContentId) -> Result<Option<Content>> {
        let row = sqlx::query_as::<_, ContentRow>("SELECT * FROM contents WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        row.map(Content::try_from).transpose()
    }

    #[instrument(skip(self, content), fields(content_id = %content.id))]
    async fn insert_content(&self, content: &Content) -> Result<()> {
        let media = &content.media;
        sqlx::query(
            "INSERT INTO contents (id, creator_id, title, description, slug, category, visibility, \
             status, age_restriction, tags, media_url, media_public_id, media_format, \
             media_duration_secs, media_bytes, thumbnail_url, thumbnail_public_id, \
             published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(content.id.0)
        .bind(content.creator_id.0)
        .bind(&content.title)
        .bind(&content.description)
        .bind(&content.slug)
        .bind(content.category.as_str())
        .bind(content.visibility.as_str())
        .bind(content.status.as_str())
        .bind(content.age_restriction.as_str())
        .bind(&content.tags)
        .bind(&media.primary.url)
        .bind(&media.primary.public_id)
        .bind(&media.primary.format)
        .bind(media.primary.duration_secs)
        .bind(media.primary.bytes)
        .bind(&media.thumbnail.url)
        .bind(&media.thumbnail.public_id)
        .bind(content.published_at)
        .bind(content.created_at)
        .bind(content.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn save_content(&self, content: &Content) -> Result<()> {
        let result = sqlx::query(
            "UPDATE contents SET title = $2, description = $3, category = $4, visibility = $5, \
             status = $6, age_restriction = $7, tags = $8, thumbnail_url = $9, \
             thumbnail_public_id = $10, published_at = $11, updated_at = $12 \
             WHERE id = $1",
        )
        .bind(content.id.0)
        .bind(&content.title)
        .bind(&content.description)
        .bind(content.category.as_str())
        .bind(content.visibility.as_str())
        .bind(content.status.as_str())
        .bind(content.age_restriction.as_str())
        .bind(&content.tags)
        .bind(&content.media.thumbnail.url)
        .bind(&content.media.thumbnail.public_id)
        .bind(content.published_at)
        .bind(content.updated_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("content", content.id));
        }
        Ok(())
    }

    async fn adjust_counter(&self, id: ContentId, counter: ContentCounter, delta: i64) -> Result<()> {
        let column = counter.column();
        let sql = format!(
            "UPDATE contents SET {column} = GREATEST({column} + $2, 0) WHERE id = $1",
            column = column
        );
        sqlx::query(&sql)
            .bind(id.0)
            .bind(delta)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn purge_relations(&self, id: ContentId) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM interactions WHERE content_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE content_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }
}

#[async_trait]
impl SocialRepository for PgStore {
    async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            "INSERT INTO profiles (id, username, display_name, avatar_url, is_verified, \
             followers, following, content_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(profile.id.0)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(profile.is_verified)
        .bind(profile.followers)
        .bind(profile.following)
        .bind(profile.content_count)
        .bind(profile.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE username = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(username.to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn adjust_profile_counter(
        &self,
        id: ProfileId,
        counter: ProfileCounter,
        delta: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE profiles SET {column} = GREATEST({column} + $2, 0) WHERE id = $1",
            column = counter.column()
        );
        sqlx::query(&sql)
            .bind(id.0)
            .bind(delta)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(kind = %interaction.kind))]
    async fn toggle_interaction(&self, interaction: Interaction) -> Result<bool> {
        let removed = sqlx::query(
            "DELETE FROM interactions WHERE profile_id = $1 AND content_id = $2 AND kind = $3",
        )
        .bind(interaction.profile_id.0)
        .bind(interaction.content_id.0)
        .bind(interaction.kind.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if removed > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO interactions (profile_id, content_id, kind) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(interaction.profile_id.0)
        .bind(interaction.content_id.0)
        .bind(interaction.kind.as_str())
        .execute(self.pool())
        .await?;
        Ok(true)
    }

    async fn has_interaction(&self, interaction: Interaction) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM interactions \
             WHERE profile_id = $1 AND content_id = $2 AND kind = $3)",
        )
        .bind(interaction.profile_id.0)
        .bind(interaction.content_id.0)
        .bind(interaction.kind.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn interacted_content_ids(
        &self,
        profile: ProfileId,
        kind: InteractionKind,
    ) -> Result<Vec<ContentId>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT content_id FROM interactions WHERE profile_id = $1 AND kind = $2 \
             ORDER BY created_at DESC, content_id",
        )
        .bind(profile.0)
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(ids.into_iter().map(ContentId::from).collect())
    }

    async fn find_connection(
        &self,
        follower: ProfileId,
        following: ProfileId,
    ) -> Result<Option<ConnectionKind>> {
        let kind = sqlx::query_scalar::<_, String>(
            "SELECT kind FROM connections WHERE follower_id = $1 AND following_id = $2",
        )
        .bind(follower.0)
        .bind(following.0)
        .fetch_optional(self.pool())
        .await?;
        kind.map(|k| stored("connection kind", &k)).transpose()
    }

    async fn put_connection(&self, connection: Connection) -> Result<()> {
        sqlx::query(
            "INSERT INTO connections (follower_id, following_id, kind) VALUES ($1, $2, $3) \
             ON CONFLICT (follower_id, following_id) \
             DO UPDATE SET kind = EXCLUDED.kind, created_at = NOW()",
        )
        .bind(connection.follower_id.0)
        .bind(connection.following_id.0)
        .bind(connection.kind.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove_connection(&self, follower: ProfileId, following: ProfileId) -> Result<()> {
        sqlx::query("DELETE FROM connections WHERE follower_id = $1 AND following_id = $2")
            .bind(follower.0)
            .bind(following.0)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn record_watch(&self, profile: ProfileId, content: ContentId) -> Result<()> {
        sqlx::query(
            "INSERT INTO watch_history (profile_id, content_id) VALUES ($1, $2) \
             ON CONFLICT (profile_id, content_id) DO UPDATE SET watched_at = NOW()",
        )
        .bind(profile.0)
        .bind(content.0)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn watch_history(&self, profile: ProfileId, page: PageRequest) -> Result<Page<ContentId>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM watch_history WHERE profile_id = $1",
        )
        .bind(profile.0)
        .fetch_one(self.pool());
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT content_id FROM watch_history WHERE profile_id = $1 \
             ORDER BY watched_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(profile.0)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(self.pool());

        let (total, ids) = tokio::try_join!(total, ids)?;
        Ok(Page::new(
            ids.into_iter().map(ContentId::from).collect(),
            total,
            page,
        ))
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, content_id, author_id, parent_id, thread_level, body, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(comment.id.0)
        .bind(comment.content_id.0)
        .bind(comment.author_id.0)
        .bind(comment.parent_id.map(|id| id.0))
        .bind(comment.thread_level)
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Comment::from))
    }

    async fn list_comments(
        &self,
        content: ContentId,
        parent: Option<CommentId>,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let filter = "content_id = $1 AND parent_id IS NOT DISTINCT FROM $2 AND NOT is_deleted";
        let parent = parent.map(|id| id.0);

        let count_sql = format!("SELECT COUNT(*) FROM comments WHERE {}", filter);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(content.0)
            .bind(parent)
            .fetch_one(self.pool());

        let rows_sql = format!(
            "SELECT {} FROM comments WHERE {} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            COMMENT_COLUMNS, filter
        );
        let rows = sqlx::query_as::<_, CommentRow>(&rows_sql)
            .bind(content.0)
            .bind(parent)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(self.pool());

        let (total, rows) = tokio::try_join!(total, rows)?;
        Ok(Page::new(rows.into_iter().map(Comment::from).collect(), total, page))
    }

    async fn mark_comment_deleted(&self, id: CommentId) -> Result<()> {
        let result = sqlx::query("UPDATE comments SET is_deleted = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("comment", id));
        }
        Ok(())
    }

    async fn adjust_comment_replies(&self, id: CommentId, delta: i64) -> Result<()> {
        sqlx::query("UPDATE comments SET replies = GREATEST(replies + $2, 0) WHERE id = $1")
            .bind(id.0)
            .bind(delta)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, sender_id, kind, related_content, \
             message, is_read, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id.0)
        .bind(notification.recipient_id.0)
        .bind(notification.sender_id.map(|id| id.0))
        .bind(notification.kind.as_str())
        .bind(notification.related_content.map(|id| id.0))
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient: ProfileId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1",
        )
        .bind(recipient.0)
        .fetch_one(self.pool());
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient_id, sender_id, kind, related_content, message, is_read, \
             created_at FROM notifications WHERE recipient_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(recipient.0)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(self.pool());

        let (total, rows) = tokio::try_join!(total, rows)?;
        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total, page))
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient: ProfileId,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(id.0)
        .bind(recipient.0)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ViewSink for PgStore {
    async fn record_view(&self, content: ContentId, viewer: Option<ProfileId>) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE contents SET views = views + 1 WHERE id = $1")
            .bind(content.0)
            .execute(&mut *tx)
            .await?;
        if let Some(viewer) = viewer {
            sqlx::query(
                "INSERT INTO watch_history (profile_id, content_id) VALUES ($1, $2) \
                 ON CONFLICT (profile_id, content_id) DO UPDATE SET watched_at = NOW()",
            )
            .bind(viewer.0)
            .bind(content.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedFilter, Predicate, SortMode, TrendingWeights};

    fn pipeline(sort: SortMode, viewer: Option<ProfileId>, query: Option<&str>) -> FeedPipeline {
        let filter = FeedFilter {
            category: Some("gaming"),
            query,
            ..Default::default()
        };
        FeedPipeline::build(
            Predicate::feed(&filter).unwrap(),
            sort,
            TrendingWeights::default(),
            viewer,
        )
    }

    #[test]
    fn test_feed_query_is_one_statement() {
        let qb = feed_query(
            &pipeline(SortMode::Trending, None, None),
            PageRequest::new(2, 20, 100).unwrap(),
        );
        let sql = qb.sql();

        assert!(sql.starts_with("WITH matched AS ("));
        assert!(sql.contains("JOIN profiles p ON p.id = c.creator_id"));
        assert!(sql.contains("AND c.status = $1"));
        assert!(sql.contains("AND c.visibility = ANY($2)"));
        assert!(sql.contains("AND c.category = $3"));
        assert!(sql.contains("AS trending_score"));
        assert!(sql.contains("NULL::boolean AS is_liked"));
        assert!(sql.contains("ORDER BY trending_score DESC, m.published_at DESC NULLS LAST, m.id DESC"));
        assert!(sql.ends_with(") page_rows ON TRUE"));
    }

    #[test]
    fn test_feed_query_viewer_and_search() {
        let qb = feed_query(
            &pipeline(SortMode::Popular, Some(ProfileId::new()), Some("speed_run")),
            PageRequest::new(1, 10, 100).unwrap(),
        );
        let sql = qb.sql();

        assert!(sql.contains("c.title ILIKE"));
        assert!(sql.contains(") AS is_liked"));
        assert!(sql.contains(") AS is_saved"));
        assert!(sql.contains("NULL::float8 AS trending_score"));
        assert!(sql.contains("ORDER BY m.views DESC, m.likes DESC, m.id DESC"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }
}
