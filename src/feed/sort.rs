//! Sort modes and the orderings they expand to

use super::join::FeedItem;
use crate::models::Content;
use std::cmp::Ordering;

/// Named sort mode from the `sortBy` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    Trending,
    #[default]
    Latest,
    Popular,
}

/// Ordering key. Every key sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    TrendingScore,
    PublishedAt,
    CreatedAt,
    Views,
    Likes,
    Id,
}

impl SortMode {
    /// Unrecognized or absent values fall back to `Latest`
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("trending") => SortMode::Trending,
            Some("popular") => SortMode::Popular,
            _ => SortMode::Latest,
        }
    }

    pub fn needs_trending_score(self) -> bool {
        self == SortMode::Trending
    }

    pub fn keys(self) -> Vec<SortKey> {
        match self {
            SortMode::Trending => vec![SortKey::TrendingScore, SortKey::PublishedAt, SortKey::Id],
            SortMode::Latest => vec![SortKey::PublishedAt, SortKey::Id],
            SortMode::Popular => vec![SortKey::Views, SortKey::Likes, SortKey::Id],
        }
    }
}

/// Anything a sort stage can order
pub trait Ranked {
    fn content(&self) -> &Content;
    fn trending_score(&self) -> Option<f64>;
}

impl Ranked for FeedItem {
    fn content(&self) -> &Content {
        &self.content
    }

    fn trending_score(&self) -> Option<f64> {
        self.trending_score
    }
}

/// Compare two rows under `keys`, first key first
pub fn compare<T: Ranked>(keys: &[SortKey], a: &T, b: &T) -> Ordering {
    let (ca, cb) = (a.content(), b.content());
    for key in keys {
        let ordering = match key {
            SortKey::TrendingScore => {
                let x = a.trending_score().unwrap_or(0.0);
                let y = b.trending_score().unwrap_or(0.0);
                y.total_cmp(&x)
            }
            // Missing publish times go last
            SortKey::PublishedAt => cb.published_at.cmp(&ca.published_at),
            SortKey::CreatedAt => cb.created_at.cmp(&ca.created_at),
            SortKey::Views => cb.metrics.views.cmp(&ca.metrics.views),
            SortKey::Likes => cb.metrics.likes.cmp(&ca.metrics.likes),
            SortKey::Id => cb.id.cmp(&ca.id),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fails_open() {
        assert_eq!(SortMode::parse(Some("trending")), SortMode::Trending);
        assert_eq!(SortMode::parse(Some("POPULAR")), SortMode::Popular);
        assert_eq!(SortMode::parse(Some("latest")), SortMode::Latest);
        assert_eq!(SortMode::parse(Some("random")), SortMode::Latest);
        assert_eq!(SortMode::parse(None), SortMode::Latest);
    }

    #[test]
    fn test_every_mode_ends_with_id() {
        for mode in [SortMode::Trending, SortMode::Latest, SortMode::Popular] {
            assert_eq!(mode.keys().last(), Some(&SortKey::Id));
        }
        assert_eq!(&SortMode::Popular.keys()[..2], &[SortKey::Views, SortKey::Likes]);
        assert!(SortMode::Trending.needs_trending_score());
        assert!(!SortMode::Latest.needs_trending_score());
    }
}
