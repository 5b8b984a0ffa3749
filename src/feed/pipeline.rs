//! The ordered stage list a store executes
//!
//! Stages are only ever appended. A store reads them in order: matches narrow the
//! set, the score stage computes `trendingScore`, the sort stage orders, and the
//! lookups attach creator and viewer data. The creator lookup is an inner join, so
//! items whose creator no longer exists drop out before counting.

use super::predicate::{Condition, Predicate};
use super::sort::{SortKey, SortMode};
use super::TrendingWeights;
use crate::models::ProfileId;

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Predicate),
    AddTrendingScore(TrendingWeights),
    Sort(Vec<SortKey>),
    LookupCreator,
    LookupViewerFlags { viewer: ProfileId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPipeline {
    stages: Vec<Stage>,
}

impl FeedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Standard feed shape: match, optional score, sort, creator join, and the
    /// viewer flags when a viewer is known
    pub fn build(
        predicate: Predicate,
        sort: SortMode,
        weights: TrendingWeights,
        viewer: Option<ProfileId>,
    ) -> Self {
        Self::with_keys(predicate, sort.keys(), sort.needs_trending_score().then_some(weights), viewer)
    }

    /// Same shape with explicit sort keys
    pub fn with_keys(
        predicate: Predicate,
        keys: Vec<SortKey>,
        weights: Option<TrendingWeights>,
        viewer: Option<ProfileId>,
    ) -> Self {
        let mut pipeline = FeedPipeline::new().push(Stage::Match(predicate));
        if let Some(weights) = weights {
            pipeline = pipeline.push(Stage::AddTrendingScore(weights));
        }
        pipeline = pipeline.push(Stage::Sort(keys)).push(Stage::LookupCreator);
        if let Some(viewer) = viewer {
            pipeline = pipeline.push(Stage::LookupViewerFlags { viewer });
        }
        pipeline
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Conditions of every match stage, in order
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.stages.iter().flat_map(|stage| match stage {
            Stage::Match(predicate) => predicate.conditions(),
            _ => &[][..],
        })
    }

    /// Keys of the last sort stage
    pub fn sort_keys(&self) -> &[SortKey] {
        self.stages
            .iter()
            .rev()
            .find_map(|stage| match stage {
                Stage::Sort(keys) => Some(keys.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn trending_weights(&self) -> Option<TrendingWeights> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::AddTrendingScore(weights) => Some(*weights),
            _ => None,
        })
    }

    pub fn joins_creator(&self) -> bool {
        self.stages.contains(&Stage::LookupCreator)
    }

    pub fn viewer(&self) -> Option<ProfileId> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::LookupViewerFlags { viewer } => Some(*viewer),
            _ => None,
        })
    }
}
