//! Page requests and the page envelope

use crate::error::{Error, Result};
use serde::Serialize;

/// A validated page request. `page` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Build from raw query values. Pages below 1 clamp to 1; the limit must be a
    /// positive integer and is capped at `max_limit`.
    pub fn parse(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: i64,
        max_limit: i64,
    ) -> Result<Self> {
        let page = match page.map(str::trim).filter(|p| !p.is_empty()) {
            None => 1,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| Error::invalid_field("page", "page must be an integer"))?,
        };
        let limit = match limit.map(str::trim).filter(|l| !l.is_empty()) {
            None => default_limit,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| Error::invalid_field("limit", "limit must be a positive integer"))?,
        };
        Self::new(page, limit, max_limit)
    }

    pub fn new(page: i64, limit: i64, max_limit: i64) -> Result<Self> {
        if limit < 1 {
            return Err(Error::invalid_field("limit", "limit must be a positive integer"));
        }
        Ok(Self {
            page: page.max(1),
            limit: limit.min(max_limit.max(1)),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Paginated result envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: i64, request: PageRequest) -> Self {
        let total_pages = if total_items <= 0 {
            0
        } else {
            (total_items + request.limit - 1) / request.limit
        };
        Self {
            items,
            current_page: request.page,
            total_pages,
            total_items: total_items.max(0),
            has_next_page: request.page < total_pages,
            has_prev_page: request.page > 1,
            limit: request.limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            total_pages: self.total_pages,
            total_items: self.total_items,
            has_next_page: self.has_next_page,
            has_prev_page: self.has_prev_page,
            limit: self.limit,
        }
    }
}

/// Slice one page out of an already ordered collection
pub fn paginate<T>(all: Vec<T>, request: PageRequest) -> Page<T> {
    let total = all.len() as i64;
    let items = all
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit as usize)
        .collect();
    Page::new(items, total, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let req = PageRequest::parse(None, None, 20, 100).unwrap();
        assert_eq!(req, PageRequest { page: 1, limit: 20 });

        let req = PageRequest::parse(Some("-3"), Some("500"), 20, 100).unwrap();
        assert_eq!(req, PageRequest { page: 1, limit: 100 });
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        assert!(PageRequest::parse(None, Some("0"), 20, 100).is_err());
        assert!(PageRequest::parse(None, Some("-1"), 20, 100).is_err());
        assert!(PageRequest::parse(None, Some("ten"), 20, 100).is_err());
    }

    #[test]
    fn test_page_counts() {
        let req = PageRequest::new(2, 10, 100).unwrap();
        let page = Page::new(vec![(); 10], 25, req);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page);
        assert!(page.has_prev_page);

        let empty: Page<()> = Page::new(vec![], 0, PageRequest::new(1, 10, 100).unwrap());
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next_page);
        assert!(!empty.has_prev_page);
    }

    #[test]
    fn test_page_beyond_end_is_empty() {
        let all: Vec<i32> = (0..25).collect();
        let page = paginate(all, PageRequest::new(4, 10, 100).unwrap());
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next_page);
    }

    #[test]
    fn test_last_page_is_partial() {
        let all: Vec<i32> = (0..25).collect();
        let page = paginate(all, PageRequest::new(3, 10, 100).unwrap());
        assert_eq!(page.items, vec![20, 21, 22, 23, 24]);
    }

    #[test]
    fn test_envelope_is_camel_case() {
        let page = Page::new(vec![1], 1, PageRequest::new(1, 10, 100).unwrap());
        let json = serde_json::to_value(page).unwrap();
        assert_eq!(json["currentPage"], 1);
        assert_eq!(json["totalItems"], 1);
        assert_eq!(json["hasNextPage"], false);
    }
}
