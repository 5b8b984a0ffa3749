//! Request-level operations over the stores
//!
//! Handlers in [`crate::api`] parse transport details (headers, multipart, query
//! strings) and hand plain values to these services.

pub mod content;
pub mod social;

pub use content::{ContentPatch, ContentService, FeedQuery, NewContent};
pub use social::{Channel, ConnectionState, InteractionState, SocialService};

use crate::error::Result;
use crate::models::{Access, ConnectionKind, Content, ProfileId};
use crate::store::SocialRepository;

/// Whether `viewer` may read `content`, looking up the follow only when the
/// item is subscribers-only
pub(crate) async fn can_view(
    social: &dyn SocialRepository,
    content: &Content,
    viewer: Option<ProfileId>,
) -> Result<bool> {
    match (content.access_for(viewer), viewer) {
        (Access::Granted, _) => Ok(true),
        (Access::FollowersOnly, Some(viewer)) => Ok(social
            .find_connection(viewer, content.creator_id)
            .await?
            == Some(ConnectionKind::Follow)),
        _ => Ok(false),
    }
}
