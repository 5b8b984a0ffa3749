//! Feed Module
//!
//! Builds the content feed as one ordered pipeline that a store executes once.
//!
//! ## Architecture
//!
//! 1. **Predicate** - request filters (category, owner, status, text query) as match conditions
//! 2. **Sort** - named sort mode to an ordering, including the computed trending score
//! 3. **Join** - creator summary plus `isLiked` / `isSaved` for a known viewer
//! 4. **Pagination** - page/limit handling and the page envelope
//!
//! ## Trending Score
//!
//! `score = 0.3 * views + 2 * likes + 3 * comments + 4 * shares` with the weights
//! configurable through [`TrendingWeights`]. Higher is better.

pub mod join;
pub mod pagination;
pub mod pipeline;
pub mod predicate;
pub mod sort;

pub use join::{CreatorSummary, FeedItem, ViewerFlags};
pub use pagination::{Page, PageRequest};
pub use pipeline::{FeedPipeline, Stage};
pub use predicate::{Condition, FeedFilter, Predicate};
pub use sort::{SortKey, SortMode};

use crate::models::Metrics;

/// Weights of the trending score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendingWeights {
    pub views: f64,
    pub likes: f64,
    pub comments: f64,
    pub shares: f64,
}

impl Default for TrendingWeights {
    fn default() -> Self {
        Self {
            views: 0.3,
            likes: 2.0,
            comments: 3.0,
            shares: 4.0,
        }
    }
}

impl TrendingWeights {
    pub fn score(&self, metrics: &Metrics) -> f64 {
        self.views * metrics.views as f64
            + self.likes * metrics.likes as f64
            + self.comments * metrics.comments as f64
            + self.shares * metrics.shares as f64
    }
}
