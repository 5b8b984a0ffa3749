//! Feed filtering, ranking, pagination and viewer flags through the services

mod common;

use common::{form, image, video, Harness};
use std::time::Duration;
use streamhub::error::Error;
use streamhub::models::{ContentId, InteractionKind, ProfileId};
use streamhub::services::{FeedQuery, NewContent};
use streamhub::store::{ContentCounter, ContentRepository};

fn query(page: &str, limit: &str) -> FeedQuery {
    FeedQuery {
        page: Some(page.into()),
        limit: Some(limit.into()),
        ..Default::default()
    }
}

async fn seeded(count: usize) -> (Harness, ProfileId, Vec<ContentId>) {
    let h = Harness::new();
    let maker = h.profile("maker").await;
    let mut ids = Vec::new();
    for i in 0..count {
        let category = if i % 2 == 0 { "music" } else { "gaming" };
        ids.push(h.publish(maker.id, &format!("Clip number {}", i), category).await);
        // Distinct publish times keep the latest ordering deterministic
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    (h, maker.id, ids)
}

#[tokio::test]
async fn page_counts_follow_limit() {
    let (h, _, _) = seeded(25).await;

    for limit in [1_i64, 7, 10, 25, 100] {
        let page = h.content.feed(&query("1", &limit.to_string()), None).await.unwrap();
        let expected_pages = (25 + limit - 1) / limit;
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, expected_pages, "limit {}", limit);
        assert!(page.items.len() as i64 <= limit);
        assert_eq!(page.has_next_page, expected_pages > 1);
    }

    for category in ["music", "gaming"] {
        let mut q = query("1", "10");
        q.category = Some(category.into());
        let page = h.content.feed(&q, None).await.unwrap();
        let expected = if category == "music" { 13 } else { 12 };
        assert_eq!(page.total_items, expected);
        assert_eq!(page.total_pages, 2);
        assert!(page
            .items
            .iter()
            .all(|item| item.content.category.as_str() == category));
    }
}

#[tokio::test]
async fn page_past_the_end_is_empty() {
    let (h, _, _) = seeded(25).await;

    let page = h.content.feed(&query("4", "10"), None).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_pages, 3);
    assert!(!page.has_next_page);
    assert!(page.has_prev_page);

    let last = h.content.feed(&query("3", "10"), None).await.unwrap();
    assert_eq!(last.items.len(), 5);
}

#[tokio::test]
async fn pages_do_not_overlap() {
    let (h, _, ids) = seeded(12).await;

    let mut seen = Vec::new();
    for page in 1..=3 {
        let result = h.content.feed(&query(&page.to_string(), "5"), None).await.unwrap();
        seen.extend(result.items.into_iter().map(|item| item.content.id));
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), ids.len());
}

#[tokio::test]
async fn bad_paging_values_are_rejected() {
    let (h, _, _) = seeded(1).await;

    for (page, limit) in [("1", "0"), ("1", "-5"), ("1", "lots"), ("first", "10")] {
        let result = h.content.feed(&query(page, limit), None).await;
        assert!(
            matches!(result, Err(Error::Validation { .. })),
            "page={} limit={}",
            page,
            limit
        );
    }

    // Out of range values clamp instead
    let page = h.content.feed(&query("-2", "1000"), None).await.unwrap();
    assert_eq!(page.current_page, 1);
    assert_eq!(page.limit, 100);
}

#[tokio::test]
async fn latest_is_the_default_order() {
    let (h, _, ids) = seeded(3).await;

    let page = h.content.feed(&FeedQuery::default(), None).await.unwrap();
    let order: Vec<_> = page.items.iter().map(|item| item.content.id).collect();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(order, newest_first);
    assert!(page.items.iter().all(|item| item.trending_score.is_none()));

    // Unknown sort names fall back to latest
    let q = FeedQuery {
        sort_by: Some("random".into()),
        ..Default::default()
    };
    let fallback = h.content.feed(&q, None).await.unwrap();
    let fallback: Vec<_> = fallback.items.iter().map(|item| item.content.id).collect();
    assert_eq!(fallback, newest_first);
}

#[tokio::test]
async fn trending_ranks_by_weighted_engagement() {
    let (h, _, ids) = seeded(2).await;
    let (older, newer) = (ids[0], ids[1]);

    // newer: 100 views, 10 likes, 5 comments, 2 shares -> 73
    // older: 50 views, 20 likes, 10 comments, 10 shares -> 125
    for (id, counts) in [(newer, [100, 10, 5, 2]), (older, [50, 20, 10, 10])] {
        let counters = [
            ContentCounter::Views,
            ContentCounter::Likes,
            ContentCounter::Comments,
            ContentCounter::Shares,
        ];
        for (counter, delta) in counters.into_iter().zip(counts) {
            h.store.adjust_counter(id, counter, delta).await.unwrap();
        }
    }

    let q = FeedQuery {
        sort_by: Some("trending".into()),
        ..Default::default()
    };
    let page = h.content.feed(&q, None).await.unwrap();
    assert_eq!(page.items[0].content.id, older);
    assert_eq!(page.items[0].trending_score, Some(125.0));
    assert_eq!(page.items[1].trending_score, Some(73.0));

    let q = FeedQuery {
        sort_by: Some("popular".into()),
        ..Default::default()
    };
    let page = h.content.feed(&q, None).await.unwrap();
    assert_eq!(page.items[0].content.id, newer);
}

#[tokio::test]
async fn viewer_flags_only_with_a_viewer() {
    let (h, _, ids) = seeded(2).await;
    let fan = h.profile("fan").await;
    h.social
        .toggle_interaction(fan.id, ids[0], InteractionKind::Like)
        .await
        .unwrap();
    h.social
        .toggle_interaction(fan.id, ids[1], InteractionKind::Save)
        .await
        .unwrap();

    let anonymous = h.content.feed(&FeedQuery::default(), None).await.unwrap();
    for item in &anonymous.items {
        assert!(item.is_liked.is_none());
        assert!(item.is_saved.is_none());
        let json = serde_json::to_value(item).unwrap();
        assert!(json.get("isLiked").is_none());
        assert!(json.get("isSaved").is_none());
    }

    let personal = h.content.feed(&FeedQuery::default(), Some(fan.id)).await.unwrap();
    for item in &personal.items {
        let liked = item.content.id == ids[0];
        assert_eq!(item.is_liked, Some(liked));
        assert_eq!(item.is_saved, Some(!liked));
    }
}

#[tokio::test]
async fn filters_by_creator_and_text() {
    let h = Harness::new();
    let alice = h.profile("alice").await;
    let bob = h.profile("bob").await;
    h.publish(alice.id, "Rust ownership explained", "education").await;
    h.publish(bob.id, "Cooking pasta", "lifestyle").await;
    let hidden = NewContent {
        visibility: Some("unlisted".into()),
        ..form("Rust hidden gem", "education")
    };
    h.content
        .create(bob.id, hidden, Some(video()), Some(image()))
        .await
        .unwrap();

    let q = FeedQuery {
        user_id: Some(bob.id.to_string()),
        ..Default::default()
    };
    let page = h.content.feed(&q, None).await.unwrap();
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].creator.username, "bob");

    let q = FeedQuery {
        query: Some("RUST".into()),
        ..Default::default()
    };
    let page = h.content.feed(&q, None).await.unwrap();
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].content.title, "Rust ownership explained");

    let q = FeedQuery {
        user_id: Some("abc123".into()),
        ..Default::default()
    };
    let err = h.content.feed(&q, None).await.unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}
