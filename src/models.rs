//! Domain models
//!
//! Content items, profiles and the social records that hang off them. Every
//! enumerated field is a closed enum parsed at the boundary; the text forms are the
//! ones the HTTP API and the database share.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse a request-supplied identifier, failing with a validation error
            /// that names `field`
            pub fn parse(raw: &str, field: &'static str) -> Result<Self> {
                Uuid::parse_str(raw.trim())
                    .map(Self)
                    .map_err(|_| Error::invalid_identifier(field))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Content item identifier
    ContentId
);
id_type!(
    /// Profile identifier
    ProfileId
);
id_type!(CommentId);
id_type!(NotificationId);

// ============================================================================
// Closed enums
// ============================================================================

macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(Error::invalid_field(
                        $field,
                        format!("unsupported {} '{}'", $field, s.trim()),
                    )),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

closed_enum!(
    /// Content category
    Category, "category" {
        Education => "education",
        Entertainment => "entertainment",
        Technology => "technology",
        Lifestyle => "lifestyle",
        Sports => "sports",
        Music => "music",
        Gaming => "gaming",
        News => "news",
        Travel => "travel",
        Cooking => "cooking",
        Fitness => "fitness",
        Art => "art",
        Business => "business",
        Science => "science",
        Other => "other",
    }
);

closed_enum!(
    /// Who may see a content item
    Visibility, "visibility" {
        Public => "public",
        Unlisted => "unlisted",
        Private => "private",
        SubscribersOnly => "subscribers-only",
    }
);

closed_enum!(
    /// Content lifecycle status
    ContentStatus, "status" {
        Draft => "draft",
        Processing => "processing",
        Published => "published",
        Archived => "archived",
        Removed => "removed",
    }
);

closed_enum!(
    AgeRestriction, "ageRestriction" {
        AllAges => "all-ages",
        Teen13 => "13+",
        Teen16 => "16+",
        Adult => "18+",
    }
);

closed_enum!(
    /// Viewer action recorded against a content item
    InteractionKind, "interactionType" {
        Like => "like",
        Dislike => "dislike",
        Save => "save",
        Share => "share",
        View => "view",
    }
);

closed_enum!(
    /// Directed relationship between two profiles
    ConnectionKind, "connectionType" {
        Follow => "follow",
        Block => "block",
        Mute => "mute",
    }
);

closed_enum!(
    NotificationKind, "type" {
        Like => "like",
        Comment => "comment",
        Follow => "follow",
        ContentPublished => "content_published",
    }
);

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

impl Default for AgeRestriction {
    fn default() -> Self {
        AgeRestriction::AllAges
    }
}

impl ContentStatus {
    /// Allowed lifecycle moves. `Removed` is reachable from anywhere and is terminal.
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        match (self, next) {
            (Removed, _) => false,
            (_, Removed) => true,
            (Draft, Processing)
            | (Processing, Published)
            | (Published, Archived)
            | (Archived, Published) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: ContentStatus) -> Result<ContentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::invalid_field(
                "status",
                format!("cannot move content from {} to {}", self, next),
            ))
        }
    }
}

// ============================================================================
// Content
// ============================================================================

/// Engagement counters of a content item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub shares: i64,
    pub comments: i64,
    pub watch_time_secs: i64,
}

impl Metrics {
    /// (likes + comments + shares) / views, zero for unviewed content
    pub fn engagement_rate(&self) -> f64 {
        if self.views <= 0 {
            return 0.0;
        }
        (self.likes + self.comments + self.shares) as f64 / self.views as f64
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Metrics", 7)?;
        state.serialize_field("views", &self.views)?;
        state.serialize_field("likes", &self.likes)?;
        state.serialize_field("dislikes", &self.dislikes)?;
        state.serialize_field("shares", &self.shares)?;
        state.serialize_field("comments", &self.comments)?;
        state.serialize_field("watchTime", &self.watch_time_secs)?;
        state.serialize_field("engagementRate", &self.engagement_rate())?;
        state.end()
    }
}

/// A stored media artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub url: String,
    pub public_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFiles {
    pub primary: MediaAsset,
    pub thumbnail: MediaAsset,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: ContentId,
    pub creator_id: ProfileId,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub category: Category,
    pub visibility: Visibility,
    pub status: ContentStatus,
    pub age_restriction: AgeRestriction,
    pub tags: Vec<String>,
    #[serde(rename = "mediaFiles")]
    pub media: MediaFiles,
    pub metrics: Metrics,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a read permission check on a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
    /// Granted only if the viewer follows the creator
    FollowersOnly,
}

impl Content {
    /// Owners see everything but removed items. Everyone else sees published
    /// items that are public or unlisted; subscribers-only items need a follow.
    pub fn access_for(&self, viewer: Option<ProfileId>) -> Access {
        if self.status == ContentStatus::Removed {
            return Access::Denied;
        }
        if viewer == Some(self.creator_id) {
            return Access::Granted;
        }
        if self.status != ContentStatus::Published {
            return Access::Denied;
        }
        match (self.visibility, viewer) {
            (Visibility::Public | Visibility::Unlisted, _) => Access::Granted,
            (Visibility::SubscribersOnly, Some(_)) => Access::FollowersOnly,
            (Visibility::SubscribersOnly, None) | (Visibility::Private, _) => Access::Denied,
        }
    }
}

/// URL slug: lowercase alphanumerics joined by dashes, cut to 50 chars, suffixed
/// with the item's own id. Two items never share a slug, whatever their titles.
pub fn slugify(title: &str, id: ContentId) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    let head: String = joined.chars().take(50).collect();
    let suffix = id.0.simple().to_string();
    if head.is_empty() {
        suffix
    } else {
        format!("{}-{}", head, suffix)
    }
}

/// `#hashtags` in free text, lowercased, without the leading `#`
pub fn extract_hashtags(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '#'))
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| tag.trim_start_matches('#'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Comma-separated tags plus description hashtags, lowercased and deduplicated
/// in first-seen order.
pub fn normalize_tags(raw: Option<&str>, description: &str) -> Vec<String> {
    let explicit = raw
        .unwrap_or_default()
        .split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty());

    let mut seen = BTreeSet::new();
    explicit
        .chain(extract_hashtags(description))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

// ============================================================================
// Profiles and social records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub followers: i64,
    pub following: i64,
    pub content_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Handles are 3-30 characters of `[a-z0-9_]`, stored lowercase
    pub fn validate_username(raw: &str) -> Result<String> {
        let handle = raw.trim().to_lowercase();
        let valid_chars = handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !(3..=30).contains(&handle.len()) || !valid_chars {
            return Err(Error::invalid_field(
                "username",
                "username must be 3-30 letters, numbers or underscores",
            ));
        }
        Ok(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub profile_id: ProfileId,
    pub content_id: ContentId,
    #[serde(rename = "interactionType")]
    pub kind: InteractionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub follower_id: ProfileId,
    pub following_id: ProfileId,
    #[serde(rename = "connectionType")]
    pub kind: ConnectionKind,
}

/// Maximum reply depth; top-level comments are level 0
pub const MAX_THREAD_LEVEL: i16 = 3;

/// Longest accepted comment body
pub const MAX_COMMENT_LENGTH: usize = 1000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub content_id: ContentId,
    pub author_id: ProfileId,
    pub parent_id: Option<CommentId>,
    pub thread_level: i16,
    #[serde(rename = "content")]
    pub body: String,
    pub likes: i64,
    pub replies: i64,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub is_reported: bool,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Thread level for a reply to `parent`, rejecting replies past the depth cap
    pub fn reply_level(parent: Option<&Comment>) -> Result<i16> {
        match parent {
            None => Ok(0),
            Some(parent) if parent.thread_level >= MAX_THREAD_LEVEL => Err(Error::invalid_field(
                "parentId",
                format!("replies are limited to {} levels", MAX_THREAD_LEVEL),
            )),
            Some(parent) => Ok(parent.thread_level + 1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: ProfileId,
    pub sender_id: Option<ProfileId>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_content: Option<ContentId>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_rate_zero_views() {
        let metrics = Metrics {
            likes: 5,
            comments: 2,
            ..Default::default()
        };
        assert_eq!(metrics.engagement_rate(), 0.0);
    }

    #[test]
    fn test_engagement_rate_ratio() {
        let metrics = Metrics {
            views: 100,
            likes: 10,
            comments: 5,
            shares: 5,
            ..Default::default()
        };
        assert!((metrics.engagement_rate() - 0.2).abs() < f64::EPSILON);

        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["engagementRate"], 0.2);
    }

    #[test]
    fn test_status_state_machine() {
        use ContentStatus::*;
        assert!(Draft.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Published));
        assert!(!Draft.can_transition_to(Published));
        assert!(!Published.can_transition_to(Draft));

        for status in ContentStatus::ALL {
            if *status != Removed {
                assert!(status.can_transition_to(Removed));
            }
            assert!(!Removed.can_transition_to(*status));
        }
        assert!(Removed.transition(Published).is_err());
    }

    #[test]
    fn test_closed_enum_parsing() {
        assert_eq!("Gaming".parse::<Category>().unwrap(), Category::Gaming);
        assert_eq!(
            "subscribers-only".parse::<Visibility>().unwrap(),
            Visibility::SubscribersOnly
        );
        assert_eq!("18+".parse::<AgeRestriction>().unwrap(), AgeRestriction::Adult);

        let err = "poetry".parse::<Category>().unwrap_err();
        assert!(matches!(err, Error::Validation { field: Some("category"), .. }));

        let parsed: Visibility = serde_json::from_str("\"unlisted\"").unwrap();
        assert_eq!(parsed, Visibility::Unlisted);
        assert_eq!(serde_json::to_string(&ContentStatus::Published).unwrap(), "\"published\"");
    }

    #[test]
    fn test_identifier_parse() {
        let id = ContentId::new();
        assert_eq!(ContentId::parse(&id.to_string(), "contentId").unwrap(), id);
        let err = ProfileId::parse("not-a-uuid", "userId").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: invalid identifier");
    }

    #[test]
    fn test_slugify() {
        let id = ContentId::new();
        assert_eq!(
            slugify("Rust in 100 Seconds!", id),
            format!("rust-in-100-seconds-{}", id.0.simple())
        );
        assert_eq!(slugify("!!!", id), id.0.simple().to_string());

        // Same title, different items
        assert_ne!(
            slugify("Hello World", ContentId::new()),
            slugify("Hello World", ContentId::new())
        );
    }

    #[test]
    fn test_normalize_tags_merges_hashtags() {
        let tags = normalize_tags(
            Some(" Rust, async ,rust,"),
            "Learning #Tokio and #rust today #",
        );
        assert_eq!(tags, vec!["rust", "async", "tokio"]);
        assert!(normalize_tags(None, "no tags here").is_empty());
    }

    #[test]
    fn test_comment_depth_cap() {
        let mut parent = Comment {
            id: CommentId::new(),
            content_id: ContentId::new(),
            author_id: ProfileId::new(),
            parent_id: None,
            thread_level: 2,
            body: "hi".into(),
            likes: 0,
            replies: 0,
            is_edited: false,
            is_deleted: false,
            is_reported: false,
            created_at: Utc::now(),
        };
        assert_eq!(Comment::reply_level(None).unwrap(), 0);
        assert_eq!(Comment::reply_level(Some(&parent)).unwrap(), 3);
        parent.thread_level = 3;
        assert!(Comment::reply_level(Some(&parent)).is_err());
    }

    #[test]
    fn test_username_validation() {
        assert_eq!(Profile::validate_username(" Alice_01 ").unwrap(), "alice_01");
        assert!(Profile::validate_username("ab").is_err());
        assert!(Profile::validate_username("bad-handle").is_err());
    }
}
