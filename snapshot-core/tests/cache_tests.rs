mod common;

use snapshot_core::{CacheStatus, DetailMap, SnapshotCache};

use common::{detail, snapshot_with};

fn generation_payload(generation: u64) -> (snapshot_core::Snapshot, DetailMap) {
    let tag = format!("gen-{generation}");
    let mut details = DetailMap::new();
    details.insert(tag.clone(), detail(&tag));
    (snapshot_with(&[tag.clone()], &tag), details)
}

#[tokio::test]
async fn new_cache_is_warming_up() {
    let cache = SnapshotCache::new();
    let view = cache.read().await;
    assert_eq!(view.status, CacheStatus::WarmingUp);
    assert!(!view.is_ready());
    assert!(view.details.is_empty());
    assert!(view.updated_at.is_none());
    assert!(cache.detail("005930").await.is_none());
}

#[tokio::test]
async fn publish_replaces_snapshot_and_details_together() {
    let cache = SnapshotCache::new();
    let (snapshot, details) = generation_payload(1);
    assert_eq!(cache.publish(snapshot, details).await, 1);

    let (snapshot, details) = generation_payload(2);
    assert_eq!(cache.publish(snapshot, details).await, 2);

    let view = cache.read().await;
    assert_eq!(view.status, CacheStatus::Ready);
    assert_eq!(view.snapshot.as_ref().map(|s| s.source.as_str()), Some("gen-2"));
    assert!(view.details.contains_key("gen-2"));
    assert!(!view.details.contains_key("gen-1"));
    assert!(cache.detail("gen-1").await.is_none());
}

#[tokio::test]
async fn mark_error_keeps_published_data() {
    let cache = SnapshotCache::new();
    let (snapshot, details) = generation_payload(1);
    cache.publish(snapshot, details).await;
    let before = cache.read().await;

    cache.mark_error().await;

    let after = cache.read().await;
    assert_eq!(after.status, CacheStatus::Error);
    assert_eq!(after.generation, 1);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.snapshot, before.snapshot);
    assert!(cache.detail("gen-1").await.is_some());
}

#[tokio::test]
async fn error_before_first_publish_has_no_snapshot() {
    let cache = SnapshotCache::new();
    cache.mark_error().await;
    let view = cache.read().await;
    assert_eq!(view.status, CacheStatus::Error);
    assert!(view.snapshot.is_none());

    let (snapshot, details) = generation_payload(1);
    cache.publish(snapshot, details).await;
    assert_eq!(cache.status().await, CacheStatus::Ready);
}

#[tokio::test]
async fn views_are_unaffected_by_later_publishes() {
    let cache = SnapshotCache::new();
    let (snapshot, details) = generation_payload(1);
    cache.publish(snapshot, details).await;
    let held = cache.read().await;

    let (snapshot, details) = generation_payload(2);
    cache.publish(snapshot, details).await;

    assert_eq!(held.generation, 1);
    assert_eq!(held.snapshot.as_ref().map(|s| s.source.as_str()), Some("gen-1"));
    assert!(held.details.contains_key("gen-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_mixed_generations() {
    let cache = SnapshotCache::new();

    let writer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            for generation in 1..=500u64 {
                let (snapshot, details) = generation_payload(generation);
                cache.publish(snapshot, details).await;
                if generation % 3 == 0 {
                    cache.mark_error().await;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let view = cache.read().await;
                    if let Some(snapshot) = &view.snapshot {
                        assert_eq!(view.details.len(), 1);
                        assert!(view.details.contains_key(&snapshot.source));
                        assert_eq!(snapshot.source, format!("gen-{}", view.generation));
                    } else {
                        assert!(view.details.is_empty());
                        assert_eq!(view.generation, 0);
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
