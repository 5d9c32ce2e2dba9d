#[cfg(test)]
#[path = "completion_cache_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::domain::models::CacheKey;
use crate::domain::models::ChatError;
use crate::domain::models::GenerationResult;

type Outcome = Result<GenerationResult, ChatError>;

enum EntryState {
    InFlight(watch::Sender<Option<Outcome>>),
    Completed {
        result: GenerationResult,
        expires_at: Instant,
    },
}

struct CacheEntry {
    state: EntryState,
    last_used: Instant,
}

/// What `get_or_create` hands back for a key.
pub enum CacheOutcome {
    /// A completed, unexpired result.
    Hit(GenerationResult),
    /// Another caller is producing this key; await its outcome.
    Wait(watch::Receiver<Option<Outcome>>),
    /// The caller is now the sole producer and must resolve the guard.
    Produce(ProducerGuard),
}

/// Content-addressed completion cache with at-most-one-in-flight-generation
/// per key. Atomicity of the in-progress/completed transition comes from
/// dashmap's sharded entry locking; there is no single lock across keys.
pub struct CompletionCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl CompletionCache {
    pub fn new(ttl: Duration, capacity: usize) -> CompletionCache {
        return CompletionCache {
            entries: DashMap::new(),
            ttl,
            capacity,
        };
    }

    /// The first caller for an unknown (or expired) key becomes the
    /// producer; concurrent callers for the same key get a waiter handle
    /// instead of triggering duplicate generation.
    pub fn get_or_create(self: &Arc<Self>, key: CacheKey) -> CacheOutcome {
        let now = Instant::now();

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                match &occupied.get().state {
                    EntryState::InFlight(tx) => {
                        return CacheOutcome::Wait(tx.subscribe());
                    }
                    EntryState::Completed { result, expires_at } => {
                        if *expires_at > now {
                            let result = result.clone();
                            occupied.get_mut().last_used = now;
                            return CacheOutcome::Hit(result);
                        }
                    }
                }

                // Expired: the caller becomes the producer for a fresh run.
                let (tx, _rx) = watch::channel(None);
                occupied.insert(CacheEntry {
                    state: EntryState::InFlight(tx),
                    last_used: now,
                });
                return CacheOutcome::Produce(ProducerGuard::new(self.clone(), key));
            }
            Entry::Vacant(vacant) => {
                let (tx, _rx) = watch::channel(None);
                vacant.insert(CacheEntry {
                    state: EntryState::InFlight(tx),
                    last_used: now,
                });
                return CacheOutcome::Produce(ProducerGuard::new(self.clone(), key));
            }
        }
    }

    /// Awaits a producer's terminal outcome. Errs out rather than waiting
    /// forever if the producer's channel vanishes without a value, which is
    /// converted to a taxonomy error so no cache-internal type leaks.
    pub async fn await_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
        loop {
            let current = rx.borrow().clone();
            if let Some(outcome) = current {
                return outcome;
            }

            if rx.changed().await.is_err() {
                return Err(ChatError::ModelError(
                    "generation ended without a result".to_string(),
                ));
            }
        }
    }

    fn complete(&self, key: &CacheKey, result: GenerationResult) {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if let EntryState::InFlight(tx) = &entry.state {
                let _ = tx.send(Some(Ok(result.clone())));
            }
            entry.state = EntryState::Completed {
                result,
                expires_at: now + self.ttl,
            };
            entry.last_used = now;
        }

        self.enforce_capacity();
    }

    fn fail(&self, key: &CacheKey, err: ChatError) {
        // No negative caching: the key is evicted and every waiter gets the
        // same error.
        if let Some((_, entry)) = self.entries.remove(key) {
            if let EntryState::InFlight(tx) = entry.state {
                let _ = tx.send(Some(Err(err)));
            }
        }
    }

    /// Evicts completed entries in least-recently-used order until the
    /// capacity bound holds. In-flight entries are never evicted; their
    /// producers still have to resolve them.
    fn enforce_capacity(&self) {
        loop {
            let completed = self
                .entries
                .iter()
                .filter_map(|entry| {
                    if let EntryState::Completed { .. } = entry.state {
                        return Some((entry.key().clone(), entry.last_used));
                    }
                    return None;
                })
                .collect::<Vec<(CacheKey, Instant)>>();

            if completed.len() <= self.capacity {
                return;
            }

            if let Some((oldest, _)) = completed.iter().min_by_key(|(_, used)| return *used) {
                self.entries.remove(oldest);
            }
        }
    }

    /// Drops expired completed entries. Called by the orchestrator's reaper.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| {
            if let EntryState::Completed { expires_at, .. } = entry.state {
                return expires_at > now;
            }
            return true;
        });
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }
}

/// Authorization to be the sole producer for a key. The producer must reach
/// a terminal outcome; dropping the guard unresolved fails the key so
/// waiters are released even when the producing task is cancelled or
/// panics.
pub struct ProducerGuard {
    cache: Arc<CompletionCache>,
    key: CacheKey,
    resolved: bool,
}

impl ProducerGuard {
    fn new(cache: Arc<CompletionCache>, key: CacheKey) -> ProducerGuard {
        return ProducerGuard {
            cache,
            key,
            resolved: false,
        };
    }

    /// A waiter handle on the producer's own key, for callers that relay a
    /// stream and still need the terminal outcome.
    pub fn subscribe(&self) -> watch::Receiver<Option<Outcome>> {
        if let Some(entry) = self.cache.entries.get(&self.key) {
            if let EntryState::InFlight(tx) = &entry.state {
                return tx.subscribe();
            }
        }

        // Key already resolved; hand back a channel that reports closed.
        let (_tx, rx) = watch::channel(None);
        return rx;
    }

    pub fn complete(mut self, result: GenerationResult) {
        self.resolved = true;
        self.cache.complete(&self.key, result);
    }

    pub fn fail(mut self, err: ChatError) {
        self.resolved = true;
        self.cache.fail(&self.key, err);
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        if !self.resolved {
            self.cache.fail(
                &self.key,
                ChatError::ModelError("generation ended without a result".to_string()),
            );
        }
    }
}
