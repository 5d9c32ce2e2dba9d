use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::CacheOutcome;
use super::CompletionCache;
use crate::domain::models::ChatError;
use crate::domain::models::FinishReason;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResult;
use crate::domain::models::SamplingParams;

fn key(prompt: &str) -> crate::domain::models::CacheKey {
    return GenerationRequest::new("gemma2:9b", prompt, SamplingParams::default()).cache_key();
}

fn result(text: &str) -> GenerationResult {
    return GenerationResult {
        text: text.to_string(),
        token_count: 2,
        finish_reason: FinishReason::Stop,
    };
}

#[tokio::test]
async fn it_returns_hits_after_completion() {
    let cache = Arc::new(CompletionCache::new(Duration::from_secs(60), 16));

    let CacheOutcome::Produce(guard) = cache.get_or_create(key("hello")) else {
        panic!("first caller should produce");
    };
    guard.complete(result("hi!"));

    let CacheOutcome::Hit(hit) = cache.get_or_create(key("hello")) else {
        panic!("second caller should hit");
    };
    assert_eq!(hit.text, "hi!");
}

#[tokio::test]
async fn it_runs_exactly_one_generation_per_key() {
    let cache = Arc::new(CompletionCache::new(Duration::from_secs(60), 16));
    let produced = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let produced = produced.clone();
        tasks.spawn(async move {
            match cache.get_or_create(key("same prompt")) {
                CacheOutcome::Hit(hit) => return Ok(hit),
                CacheOutcome::Wait(rx) => return CompletionCache::await_outcome(rx).await,
                CacheOutcome::Produce(guard) => {
                    produced.fetch_add(1, Ordering::SeqCst);
                    guard.complete(result("singleflight"));
                    return Ok(result("singleflight"));
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap().unwrap();
        assert_eq!(outcome.text, "singleflight");
    }
    assert_eq!(produced.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_releases_waiters_on_failure_and_evicts_the_key() {
    let cache = Arc::new(CompletionCache::new(Duration::from_secs(60), 16));

    let CacheOutcome::Produce(guard) = cache.get_or_create(key("doomed")) else {
        panic!("first caller should produce");
    };
    let CacheOutcome::Wait(rx) = cache.get_or_create(key("doomed")) else {
        panic!("second caller should wait");
    };

    guard.fail(ChatError::ModelError("backend fault".to_string()));

    let outcome = CompletionCache::await_outcome(rx).await;
    assert_eq!(
        outcome,
        Err(ChatError::ModelError("backend fault".to_string()))
    );

    // No negative caching: the next caller becomes a fresh producer.
    assert!(matches!(
        cache.get_or_create(key("doomed")),
        CacheOutcome::Produce(_)
    ));
}

#[tokio::test]
async fn it_resolves_the_key_when_a_producer_is_dropped() {
    let cache = Arc::new(CompletionCache::new(Duration::from_secs(60), 16));

    let CacheOutcome::Produce(guard) = cache.get_or_create(key("abandoned")) else {
        panic!("first caller should produce");
    };
    let CacheOutcome::Wait(rx) = cache.get_or_create(key("abandoned")) else {
        panic!("second caller should wait");
    };

    // A cancelled producer task drops its guard without resolving.
    drop(guard);

    let outcome = CompletionCache::await_outcome(rx).await;
    assert!(matches!(outcome, Err(ChatError::ModelError(_))));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn it_expires_entries_after_the_ttl() {
    let cache = Arc::new(CompletionCache::new(Duration::from_millis(20), 16));

    let CacheOutcome::Produce(guard) = cache.get_or_create(key("short lived")) else {
        panic!("first caller should produce");
    };
    guard.complete(result("cached"));

    tokio::time::sleep(Duration::from_millis(40)).await;

    assert!(matches!(
        cache.get_or_create(key("short lived")),
        CacheOutcome::Produce(_)
    ));
}

#[tokio::test]
async fn it_evicts_least_recently_used_entries_at_capacity() {
    let cache = Arc::new(CompletionCache::new(Duration::from_secs(60), 2));

    for prompt in ["first", "second", "third"] {
        let CacheOutcome::Produce(guard) = cache.get_or_create(key(prompt)) else {
            panic!("each new key should produce");
        };
        guard.complete(result(prompt));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(cache.len(), 2);
    // "first" was the least recently used entry.
    assert!(matches!(
        cache.get_or_create(key("first")),
        CacheOutcome::Produce(_)
    ));
    assert!(matches!(
        cache.get_or_create(key("third")),
        CacheOutcome::Hit(_)
    ));
}

#[tokio::test]
async fn it_purges_expired_entries() {
    let cache = Arc::new(CompletionCache::new(Duration::from_millis(10), 16));

    let CacheOutcome::Produce(guard) = cache.get_or_create(key("stale")) else {
        panic!("first caller should produce");
    };
    guard.complete(result("stale"));
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_millis(30)).await;
    cache.purge_expired();
    assert!(cache.is_empty());
}
