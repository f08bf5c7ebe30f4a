use super::*;
use crate::test_support::ScriptedCatalog;
use std::sync::atomic::Ordering;

fn cache_over(catalog: Arc<ScriptedCatalog>, config: CacheConfig) -> Arc<PageCache> {
    PageCache::new(catalog, config)
}

#[tokio::test]
async fn fetches_first_page_with_merged_details() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let page = cache.fetch_page(0).await.expect("page");

    assert_eq!(page.offset, 0);
    assert_eq!(page.next_offset, 6);
    assert!(page.has_more);
    let ids: Vec<i64> = page.items.iter().map(|item| item.id.0).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(catalog.list_calls(), 1);
    assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 6);
    assert_eq!(cache.cached_len(), 6);
    assert_eq!(cache.next_offset(), 6);
    assert!(!cache.is_fetching());
}

#[tokio::test]
async fn fresh_page_is_served_without_network() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let first = cache.fetch_page(0).await.expect("first");
    let second = cache.fetch_page(0).await.expect("second");

    assert_eq!(first, second);
    assert_eq!(catalog.list_calls(), 1);
}

#[tokio::test]
async fn stale_page_is_refetched_in_place() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    let cache = cache_over(
        Arc::clone(&catalog),
        CacheConfig {
            page_size: 6,
            stale_after: Duration::ZERO,
        },
    );

    cache.fetch_page(0).await.expect("first");
    cache.fetch_page(0).await.expect("refetch");

    assert_eq!(catalog.list_calls(), 2);
    assert_eq!(cache.snapshot().page_count, 1);
    assert_eq!(cache.cached_len(), 6);
}

#[tokio::test]
async fn partial_page_is_discarded_and_retry_refetches_everything() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    catalog.fail_detail(3).await;
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let err = cache.fetch_page(0).await.expect_err("detail failure");
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
    assert_eq!(cache.cached_len(), 0);
    let snapshot = cache.snapshot();
    assert_eq!(snapshot.page_count, 0);
    assert!(snapshot.last_error.is_some());
    assert!(!snapshot.is_fetching);

    catalog.heal_detail(3).await;
    let page = cache.fetch_page(0).await.expect("retry");
    assert_eq!(page.items.len(), 6);
    assert_eq!(catalog.list_calls(), 2);
    assert_eq!(cache.snapshot().last_error, None);
}

#[tokio::test]
async fn concurrent_fetch_is_rejected_while_one_is_in_flight() {
    let (catalog, gate) = ScriptedCatalog::gated(20);
    let catalog = Arc::new(catalog);
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.fetch_page(0).await })
    };
    while !cache.is_fetching() {
        tokio::task::yield_now().await;
    }

    for _ in 0..5 {
        let err = cache.fetch_page(6).await.expect_err("single flight");
        assert!(err.is_in_progress());
    }

    gate.add_permits(1);
    let page = pending.await.expect("join").expect("page");
    assert_eq!(page.items.len(), 6);
    assert_eq!(catalog.list_calls(), 1);
    assert!(!cache.is_fetching());
}

#[tokio::test]
async fn abandoned_fetch_still_lands_in_cache() {
    let (catalog, gate) = ScriptedCatalog::gated(20);
    let catalog = Arc::new(catalog);
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.fetch_page(0).await })
    };
    while !cache.is_fetching() {
        tokio::task::yield_now().await;
    }
    waiter.abort();
    let _ = waiter.await;

    gate.add_permits(1);
    while cache.is_fetching() {
        tokio::task::yield_now().await;
    }
    assert_eq!(cache.cached_len(), 6);
}

#[tokio::test]
async fn last_page_marks_cache_exhausted() {
    let catalog = Arc::new(ScriptedCatalog::new(8));
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    assert!(cache.has_more());
    cache.fetch_page(0).await.expect("first");
    assert!(cache.has_more());
    let last = cache.fetch_page(6).await.expect("last");

    assert_eq!(last.items.len(), 2);
    assert!(!last.has_more);
    assert!(!cache.has_more());
    assert!(cache.snapshot().exhausted);

    let ids: Vec<i64> = cache
        .all_cached_items()
        .iter()
        .map(|item| item.id.0)
        .collect();
    assert_eq!(ids, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn list_failure_is_surfaced_and_not_cached() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    catalog.set_list_failure(true);
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let err = cache.fetch_page(0).await.expect_err("list failure");
    assert!(matches!(err, FetchError::Unavailable(_)));
    assert_eq!(catalog.detail_calls.load(Ordering::SeqCst), 0);
    assert!(cache.has_more());
}

#[tokio::test]
async fn fresh_page_is_served_while_another_offset_is_in_flight() {
    let (catalog, gate) = ScriptedCatalog::gated(20);
    let catalog = Arc::new(catalog);
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    gate.add_permits(1);
    cache.fetch_page(0).await.expect("first page");

    let pending = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.fetch_page(6).await })
    };
    while !cache.is_fetching() {
        tokio::task::yield_now().await;
    }

    let cached = cache.fetch_page(0).await.expect("fresh hit during fetch");
    assert_eq!(cached.items.len(), 6);
    assert_eq!(catalog.list_calls(), 2);

    gate.add_permits(1);
    pending.await.expect("join").expect("second page");
    assert_eq!(cache.cached_len(), 12);
}

#[tokio::test]
async fn start_fetch_claims_the_slot_before_the_network_resolves() {
    let (catalog, gate) = ScriptedCatalog::gated(20);
    let cache = cache_over(Arc::new(catalog), CacheConfig::default());

    let FetchStart::Started(pending) = cache.start_fetch(0).expect("claim") else {
        panic!("empty cache cannot serve a hit");
    };
    assert_eq!(pending.offset(), 0);
    assert!(cache.snapshot().is_fetching);
    assert!(cache.start_fetch(6).err().expect("busy").is_in_progress());

    gate.add_permits(1);
    let page = pending.finish().await.expect("page");
    assert_eq!(page.items.len(), 6);
    assert!(!cache.snapshot().is_fetching);
}

#[tokio::test]
async fn shorter_refetch_keeps_items_already_cached() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    let cache = cache_over(
        Arc::clone(&catalog),
        CacheConfig {
            page_size: 6,
            stale_after: Duration::ZERO,
        },
    );
    cache.fetch_page(0).await.expect("first");

    catalog.set_total(4);
    cache.fetch_page(0).await.expect("refetch");

    assert_eq!(catalog.list_calls(), 2);
    assert_eq!(cache.cached_len(), 6);
    let ids: Vec<i64> = cache
        .all_cached_items()
        .iter()
        .map(|item| item.id.0)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn offset_near_the_limit_saturates_the_cursor() {
    let catalog = Arc::new(ScriptedCatalog::new(20));
    let cache = cache_over(Arc::clone(&catalog), CacheConfig::default());

    let page = cache.fetch_page(u32::MAX - 2).await.expect("empty page");

    assert!(page.items.is_empty());
    assert!(!page.has_more);
    assert_eq!(page.next_offset, u32::MAX);
}
