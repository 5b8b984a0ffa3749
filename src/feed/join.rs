//! Creator and viewer data attached to feed rows

use crate::models::{Content, Profile, ProfileId};
use serde::Serialize;

/// Trimmed creator profile shown next to each item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorSummary {
    pub id: ProfileId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub followers: i64,
}

impl From<&Profile> for CreatorSummary {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            username: profile.username.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            is_verified: profile.is_verified,
            followers: profile.followers,
        }
    }
}

/// Per-viewer interaction state of one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerFlags {
    pub is_liked: bool,
    pub is_saved: bool,
}

/// A content item joined with its creator. `isLiked` / `isSaved` are left out
/// of the JSON entirely when no viewer is known.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub content: Content,
    pub creator: CreatorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trending_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_saved: Option<bool>,
}

impl FeedItem {
    pub fn new(content: Content, creator: CreatorSummary) -> Self {
        Self {
            content,
            creator,
            trending_score: None,
            is_liked: None,
            is_saved: None,
        }
    }

    pub fn with_viewer_flags(mut self, flags: ViewerFlags) -> Self {
        self.is_liked = Some(flags.is_liked);
        self.is_saved = Some(flags.is_saved);
        self
    }
}
