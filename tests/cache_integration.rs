//! Dedup cache persistence across process restarts.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use thesis_downloader_core::{CacheOutcome, DedupCache, ItemId};

fn id(raw: &str) -> ItemId {
    ItemId::parse(raw).unwrap()
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("cache.db");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();

    let cache = DedupCache::open(&path).await.unwrap();
    let saved = CacheOutcome::Saved(vec![PathBuf::from("out/1-a.pdf"), PathBuf::from("out/1-b.pdf")]);
    assert!(cache.set(&id("1"), &saved).await.unwrap());
    assert!(
        cache
            .set(&id("2"), &CacheOutcome::NotFound { reason: "permanent: HTTP 404".into() })
            .await
            .unwrap()
    );
    cache.close().await;

    let reopened = DedupCache::open(&path).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 2);
    assert_eq!(reopened.get(&id("1")).await.unwrap().unwrap().outcome, saved);
    assert_eq!(reopened.keys().await.unwrap(), vec![id("1"), id("2")]);
}

#[tokio::test]
async fn test_concurrent_writers_keep_first_outcome() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(DedupCache::open(&dir.path().join("cache.db")).await.unwrap());

    let writers: Vec<_> = (0..8)
        .map(|n| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .set(&id("7"), &CacheOutcome::NotFound { reason: format!("writer {n}") })
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut inserted = 0;
    for writer in writers {
        if writer.await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(cache.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_leading_zero_ids_are_distinct() {
    let dir = TempDir::new().unwrap();
    let cache = DedupCache::open(&dir.path().join("cache.db")).await.unwrap();
    let outcome = CacheOutcome::NotFound { reason: "x".into() };
    assert!(cache.set(&id("7"), &outcome).await.unwrap());
    assert!(cache.set(&id("007"), &outcome).await.unwrap());
    assert!(cache.contains(&id("007")).await.unwrap());
    assert_eq!(cache.len().await.unwrap(), 2);
}
