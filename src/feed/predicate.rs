//! Match conditions built from request parameters

use crate::error::Result;
use crate::models::{Category, Content, ContentId, ContentStatus, ProfileId, Visibility};

/// A single match condition. A [`Predicate`] is the conjunction of its conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    StatusIs(ContentStatus),
    StatusIsNot(ContentStatus),
    VisibilityIn(Vec<Visibility>),
    CategoryIs(Category),
    CreatorIs(ProfileId),
    IdIn(Vec<ContentId>),
    /// Case-insensitive substring over title and description
    TextSearch(String),
}

impl Condition {
    pub fn matches(&self, content: &Content) -> bool {
        match self {
            Condition::StatusIs(status) => content.status == *status,
            Condition::StatusIsNot(status) => content.status != *status,
            Condition::VisibilityIn(allowed) => allowed.contains(&content.visibility),
            Condition::CategoryIs(category) => content.category == *category,
            Condition::CreatorIs(creator) => content.creator_id == *creator,
            Condition::IdIn(ids) => ids.contains(&content.id),
            Condition::TextSearch(needle) => {
                let needle = needle.to_lowercase();
                content.title.to_lowercase().contains(&needle)
                    || content.description.to_lowercase().contains(&needle)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Every condition holds; an empty predicate matches everything
    pub fn matches(&self, content: &Content) -> bool {
        self.conditions.iter().all(|c| c.matches(content))
    }

    /// The general feed: published public content, optionally narrowed
    pub fn feed(filter: &FeedFilter<'_>) -> Result<Self> {
        let mut predicate = Predicate::new()
            .and(Condition::StatusIs(ContentStatus::Published))
            .and(Condition::VisibilityIn(vec![Visibility::Public]));

        if let Some(category) = parse_category(filter.category)? {
            predicate = predicate.and(Condition::CategoryIs(category));
        }
        if let Some(raw) = non_blank(filter.user_id) {
            predicate = predicate.and(Condition::CreatorIs(ProfileId::parse(raw, "userId")?));
        }
        if let Some(query) = non_blank(filter.query) {
            predicate = predicate.and(Condition::TextSearch(query.to_string()));
        }

        Ok(predicate)
    }

    /// A creator's own listing. Everything they own except removed items (status
    /// absent or `"all"`), or only the requested status.
    pub fn owned_by(owner: ProfileId, status: Option<&str>) -> Result<Self> {
        let predicate = Predicate::new().and(Condition::CreatorIs(owner));
        Ok(match non_blank(status) {
            Some(raw) if !raw.eq_ignore_ascii_case("all") => {
                predicate.and(Condition::StatusIs(raw.parse()?))
            }
            _ => predicate.and(Condition::StatusIsNot(ContentStatus::Removed)),
        })
    }

    /// Published items out of a known id set (liked content, watch history).
    /// Subscribers-only items still need a follow check by the caller.
    pub fn visible_ids(ids: Vec<ContentId>) -> Self {
        Predicate::new()
            .and(Condition::IdIn(ids))
            .and(Condition::StatusIs(ContentStatus::Published))
            .and(Condition::VisibilityIn(vec![
                Visibility::Public,
                Visibility::Unlisted,
                Visibility::SubscribersOnly,
            ]))
    }
}

/// Raw feed filters as they arrive on the query string
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedFilter<'a> {
    pub category: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub query: Option<&'a str>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `"all"` and absent mean no category constraint
fn parse_category(raw: Option<&str>) -> Result<Option<Category>> {
    match non_blank(raw) {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => value.parse().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_feed_predicate_defaults() {
        let predicate = Predicate::feed(&FeedFilter::default()).unwrap();
        assert_eq!(
            predicate.conditions(),
            &[
                Condition::StatusIs(ContentStatus::Published),
                Condition::VisibilityIn(vec![Visibility::Public]),
            ]
        );
    }

    #[test]
    fn test_category_all_is_no_filter() {
        let filter = FeedFilter {
            category: Some("all"),
            ..Default::default()
        };
        assert_eq!(Predicate::feed(&filter).unwrap().conditions().len(), 2);

        let filter = FeedFilter {
            category: Some("music"),
            query: Some("  lofi "),
            ..Default::default()
        };
        let predicate = Predicate::feed(&filter).unwrap();
        assert!(predicate
            .conditions()
            .contains(&Condition::CategoryIs(Category::Music)));
        assert!(predicate
            .conditions()
            .contains(&Condition::TextSearch("lofi".into())));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let filter = FeedFilter {
            category: Some("cats"),
            ..Default::default()
        };
        assert!(matches!(
            Predicate::feed(&filter),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_invalid_owner_id_rejected() {
        let filter = FeedFilter {
            user_id: Some("abc123"),
            ..Default::default()
        };
        let err = Predicate::feed(&filter).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: invalid identifier");
    }

    #[test]
    fn test_owner_listing_status() {
        let owner = ProfileId::new();
        let all = Predicate::owned_by(owner, None).unwrap();
        assert!(all
            .conditions()
            .contains(&Condition::StatusIsNot(ContentStatus::Removed)));

        let drafts = Predicate::owned_by(owner, Some("draft")).unwrap();
        assert!(drafts
            .conditions()
            .contains(&Condition::StatusIs(ContentStatus::Draft)));

        assert_eq!(Predicate::owned_by(owner, Some("all")).unwrap(), all);
        assert!(Predicate::owned_by(owner, Some("deleted")).is_err());
    }
}
