//! HTTP API server
//!
//! REST endpoints for feeds, uploads and the social graph. Handlers only deal
//! with transport details (identity header, path ids, query strings, multipart
//! forms) and delegate everything else to [`crate::services`].

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::media::{MediaKind, MediaUpload};
use crate::models::{CommentId, ConnectionKind, ContentId, InteractionKind, NotificationId, ProfileId};
use crate::services::{ContentPatch, ContentService, FeedQuery, NewContent, SocialService};
use crate::store::ContentRepository;

/// Header carrying the caller's profile id
pub const PROFILE_HEADER: &str = "x-profile-id";

/// Shared application state
pub struct AppState {
    pub api: ApiConfig,
    pub content: ContentService,
    pub social: SocialService,
    /// Used by the status endpoint
    pub store: Arc<dyn ContentRepository>,
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub success: bool,
    pub message: String,
    pub data: T,
}

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let body = ApiResponse {
        status_code: status.as_u16(),
        success: status.is_success(),
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// Identity
// ============================================================================

/// Optional caller identity
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<ProfileId>);

/// Required caller identity
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub ProfileId);

fn profile_header(parts: &Parts) -> Result<Option<ProfileId>> {
    match parts.headers.get(PROFILE_HEADER) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| Error::invalid_identifier(PROFILE_HEADER))?;
            ProfileId::parse(raw, PROFILE_HEADER).map(Some)
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        profile_header(parts).map(Viewer)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        profile_header(parts)?
            .map(Actor)
            .ok_or_else(|| Error::unauthorized("x-profile-id header is required"))
    }
}

// ============================================================================
// Query strings and bodies
// ============================================================================

/// Query params for the feed
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub user_id: Option<String>,
    pub query: Option<String>,
}

impl From<FeedParams> for FeedQuery {
    fn from(params: FeedParams) -> Self {
        FeedQuery {
            page: params.page,
            limit: params.limit,
            category: params.category,
            sort_by: params.sort_by,
            user_id: params.user_id,
            query: params.query,
        }
    }
}

/// Query params shared by list endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub content: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Text fields plus the two file slots of an upload form
#[derive(Debug, Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    media_file: Option<MediaUpload>,
    thumbnail: Option<MediaUpload>,
}

impl UploadForm {
    fn take(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    fn into_new_content(mut self) -> (NewContent, Option<MediaUpload>, Option<MediaUpload>) {
        let form = NewContent {
            title: self.take("title"),
            description: self.take("description"),
            category: self.take("category"),
            tags: self.take("tags"),
            visibility: self.take("visibility"),
            age_restriction: self.take("ageRestriction"),
        };
        (form, self.media_file, self.thumbnail)
    }

    fn into_patch(mut self) -> (ContentPatch, Option<MediaUpload>) {
        let patch = ContentPatch {
            title: self.take("title"),
            description: self.take("description"),
            category: self.take("category"),
            tags: self.take("tags"),
            visibility: self.take("visibility"),
            age_restriction: self.take("ageRestriction"),
            status: self.take("status"),
        };
        (patch, self.thumbnail)
    }
}

fn bad_multipart(err: impl std::fmt::Display) -> Error {
    Error::validation(format!("Malformed multipart body: {}", err))
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        let kind = match name.as_str() {
            "mediaFile" => Some(MediaKind::Video),
            "thumbnail" => Some(MediaKind::Image),
            _ => None,
        };

        match kind {
            Some(kind) => {
                let file_name = field.file_name().unwrap_or(name.as_str()).to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(bad_multipart)?;
                if data.is_empty() {
                    continue;
                }
                let upload = MediaUpload {
                    kind,
                    file_name,
                    content_type,
                    data,
                };
                match kind {
                    MediaKind::Video => form.media_file = Some(upload),
                    MediaKind::Image => form.thumbnail = Some(upload),
                }
            }
            None => {
                let value = field.text().await.map_err(bad_multipart)?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    if config.cors_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(origins)
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.api);
    let timeout = TimeoutLayer::new(state.api.request_timeout);
    let body_limit = DefaultBodyLimit::max(state.api.max_body_size);

    Router::new()
        // Health
        .route("/health", get(health_check))
        .route("/api/v1/system/status", get(system_status))
        // Content
        .route("/api/v1/content", get(get_feed).post(create_content))
        .route("/api/v1/content/mine", get(get_my_content))
        .route(
            "/api/v1/content/:id",
            get(get_content).patch(update_content).delete(delete_content),
        )
        .route("/api/v1/content/:id/publish", patch(toggle_publish))
        .route(
            "/api/v1/content/:id/comments",
            get(list_comments).post(add_comment),
        )
        // Social
        .route(
            "/api/v1/social/interactions/:id/:kind",
            post(toggle_interaction),
        )
        .route("/api/v1/social/follow/:profile_id", post(toggle_connection))
        .route("/api/v1/social/liked", get(get_liked))
        .route("/api/v1/comments/:id", delete(delete_comment))
        // Profiles
        .route("/api/v1/profile", post(create_profile))
        .route("/api/v1/profile/history", get(get_history))
        .route("/api/v1/profile/:username", get(get_channel))
        // Notifications
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/:id/read", patch(mark_notification_read))
        .layer(body_limit)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the shutdown channel fires
pub async fn serve(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.api.host, state.api.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(Error::internal)?;
    info!("🚀 StreamHub API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("API server shutting down");
        })
        .await
        .map_err(Error::internal)
}

// ============================================================================
// Health
// ============================================================================

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn system_status(State(state): State<Arc<AppState>>) -> Result<Response> {
    state.store.health_check().await?;
    Ok(respond(
        StatusCode::OK,
        "System is operational",
        serde_json::json!({ "store": "connected", "version": env!("CARGO_PKG_VERSION") }),
    ))
}

// ============================================================================
// Content
// ============================================================================

async fn get_feed(
    State(state): State<Arc<AppState>>,
    Viewer(viewer): Viewer,
    Query(params): Query<FeedParams>,
) -> Result<Response> {
    let page = state.content.feed(&params.into(), viewer).await?;
    Ok(respond(StatusCode::OK, "Content fetched successfully", page))
}

async fn create_content(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    multipart: Multipart,
) -> Result<Response> {
    let (form, media_file, thumbnail) = read_form(multipart).await?.into_new_content();
    let item = state
        .content
        .create(actor, form, media_file, thumbnail)
        .await?;
    Ok(respond(StatusCode::CREATED, "Content uploaded successfully", item))
}

async fn get_my_content(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = state
        .content
        .list_page(params.page.as_deref(), params.limit.as_deref())?;
    let items = state
        .content
        .list_mine(actor, page, params.status.as_deref())
        .await?;
    Ok(respond(StatusCode::OK, "Your content fetched successfully", items))
}

async fn get_content(
    State(state): State<Arc<AppState>>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let item = state.content.get_by_id(id, viewer).await?;
    Ok(respond(StatusCode::OK, "Content fetched successfully", item))
}

async fn update_content(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let (patch, thumbnail) = read_form(multipart).await?.into_patch();
    let content = state.content.update(actor, id, patch, thumbnail).await?;
    Ok(respond(StatusCode::OK, "Content updated successfully", content))
}

async fn delete_content(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    state.content.delete(actor, id).await?;
    Ok(respond(
        StatusCode::OK,
        "Content deleted successfully",
        serde_json::Value::Null,
    ))
}

async fn toggle_publish(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let content = state.content.toggle_publish(actor, id).await?;
    Ok(respond(StatusCode::OK, "Publish status toggled", content))
}

// ============================================================================
// Comments
// ============================================================================

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let parent = match params.parent_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(CommentId::parse(raw, "parentId")?),
        _ => None,
    };
    let page = state
        .social
        .list_page(params.page.as_deref(), params.limit.as_deref())?;
    let comments = state.social.comments(id, parent, viewer, page).await?;
    Ok(respond(StatusCode::OK, "Comments fetched successfully", comments))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let parent = match body.parent_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(CommentId::parse(raw, "parentId")?),
        _ => None,
    };
    let comment = state
        .social
        .add_comment(actor, id, &body.content, parent)
        .await?;
    Ok(respond(StatusCode::CREATED, "Comment added successfully", comment))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = CommentId::parse(&id, "id")?;
    state.social.delete_comment(actor, id).await?;
    Ok(respond(
        StatusCode::OK,
        "Comment deleted successfully",
        serde_json::Value::Null,
    ))
}

// ============================================================================
// Social
// ============================================================================

async fn toggle_interaction(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path((id, kind)): Path<(String, String)>,
) -> Result<Response> {
    let id = ContentId::parse(&id, "id")?;
    let kind: InteractionKind = kind.parse()?;
    let result = state.social.toggle_interaction(actor, id, kind).await?;
    let message = if result.active {
        format!("{} added", kind)
    } else {
        format!("{} removed", kind)
    };
    Ok(respond(StatusCode::OK, message, result))
}

async fn toggle_connection(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(target): Path<String>,
    Query(params): Query<ConnectionParams>,
) -> Result<Response> {
    let target = ProfileId::parse(&target, "profileId")?;
    let kind = match params.kind.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse()?,
        _ => ConnectionKind::Follow,
    };
    let result = state.social.toggle_connection(actor, target, kind).await?;
    Ok(respond(StatusCode::OK, "Connection updated", result))
}

async fn get_liked(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = state
        .social
        .list_page(params.page.as_deref(), params.limit.as_deref())?;
    let items = state.social.liked(actor, page).await?;
    Ok(respond(StatusCode::OK, "Liked content fetched successfully", items))
}

// ============================================================================
// Profiles
// ============================================================================

async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProfileRequest>,
) -> Result<Response> {
    let profile = state
        .social
        .create_profile(
            &body.username,
            body.display_name.as_deref(),
            body.avatar_url.as_deref(),
        )
        .await?;
    Ok(respond(StatusCode::CREATED, "Profile created successfully", profile))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = state
        .social
        .list_page(params.page.as_deref(), params.limit.as_deref())?;
    let items = state.social.history(actor, page).await?;
    Ok(respond(StatusCode::OK, "Watch history fetched successfully", items))
}

async fn get_channel(
    State(state): State<Arc<AppState>>,
    Viewer(viewer): Viewer,
    Path(username): Path<String>,
) -> Result<Response> {
    let channel = state.social.channel(&username, viewer).await?;
    Ok(respond(StatusCode::OK, "Channel fetched successfully", channel))
}

// ============================================================================
// Notifications
// ============================================================================

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let page = state
        .social
        .list_page(params.page.as_deref(), params.limit.as_deref())?;
    let notifications = state.social.notifications(actor, page).await?;
    Ok(respond(
        StatusCode::OK,
        "Notifications fetched successfully",
        notifications,
    ))
}

async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = NotificationId::parse(&id, "id")?;
    state.social.mark_read(actor, id).await?;
    Ok(respond(
        StatusCode::OK,
        "Notification marked as read",
        serde_json::Value::Null,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = ApiResponse {
            status_code: 201,
            success: true,
            message: "ok".to_string(),
            data: serde_json::Value::Null,
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["success"], true);
        assert!(json["data"].is_null());
    }

    #[test]
    fn test_profile_header_parsing() {
        let (mut parts, _) = axum::http::Request::builder()
            .header(PROFILE_HEADER, "not-a-uuid")
            .body(())
            .unwrap()
            .into_parts();
        assert!(profile_header(&parts).is_err());

        let id = ProfileId::new();
        parts
            .headers
            .insert(PROFILE_HEADER, id.to_string().parse().unwrap());
        assert_eq!(profile_header(&parts).unwrap(), Some(id));

        parts.headers.remove(PROFILE_HEADER);
        assert_eq!(profile_header(&parts).unwrap(), None);
    }
}
