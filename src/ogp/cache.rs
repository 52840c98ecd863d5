use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::fetch::{FetchError, FetchOutcome, OgpFetcher};

pub const CACHE_TTL: Duration = Duration::from_secs(600);

/// Source of "now" for TTL bookkeeping. Injected so tests can move time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type SharedOutcome = Shared<BoxFuture<'static, Arc<FetchOutcome>>>;

enum Entry {
    Pending {
        id: u64,
        outcome: SharedOutcome,
        invalidated: bool,
    },
    Ready {
        outcome: Arc<FetchOutcome>,
        completed_at: Instant,
    },
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    by_url: HashMap<String, Entry>,
}

/// Coalescing, TTL-bounded cache in front of an `OgpFetcher`.
///
/// Concurrent `get` calls for one URL share a single in-flight fetch, and every
/// caller receives the same `Arc<FetchOutcome>`. Successes and failures are both
/// kept for `ttl`. Cheaply cloneable: all clones share the same table via `Arc`.
#[derive(Clone)]
pub struct OgpRequestCache {
    entries: Arc<Mutex<Entries>>,
    fetcher: Arc<dyn OgpFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl OgpRequestCache {
    pub fn new(fetcher: Arc<dyn OgpFetcher>, ttl: Duration) -> Self {
        Self::with_clock(fetcher, Arc::new(SystemClock), ttl)
    }

    pub fn with_clock(fetcher: Arc<dyn OgpFetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            fetcher,
            clock,
            ttl,
        }
    }

    /// Resolve `url`, fetching only when there is neither a fresh cached outcome
    /// nor a fetch already in flight for it.
    ///
    /// The fetch runs as a spawned task, so it completes (and populates the
    /// cache) even if every caller stops waiting. Must be called within a tokio
    /// runtime.
    pub async fn get(&self, url: &str) -> Arc<FetchOutcome> {
        let pending = {
            let mut entries = self.lock();
            let now = self.clock.now();

            match entries.by_url.get(url) {
                Some(Entry::Ready {
                    outcome,
                    completed_at,
                }) if now.saturating_duration_since(*completed_at) < self.ttl => {
                    tracing::debug!(url = %url, "OGP cache hit");
                    return Arc::clone(outcome);
                }
                Some(Entry::Pending { outcome, .. }) => {
                    tracing::debug!(url = %url, "Joining in-flight OGP fetch");
                    outcome.clone()
                }
                _ => self.start_fetch(&mut entries, url),
            }
        };

        pending.await
    }

    /// Drop the cached outcome for `url` so the next `get` fetches again.
    ///
    /// An in-flight fetch is not duplicated: its waiters still receive its
    /// outcome, but the outcome is discarded instead of cached.
    pub fn invalidate(&self, url: &str) {
        let mut entries = self.lock();
        let resolved = match entries.by_url.get_mut(url) {
            Some(Entry::Pending { invalidated, .. }) => {
                *invalidated = true;
                false
            }
            Some(Entry::Ready { .. }) => true,
            None => false,
        };
        if resolved {
            entries.by_url.remove(url);
        }
    }

    /// Remove every resolved entry older than the TTL. Returns how many were
    /// removed. Lookups already treat such entries as misses; this only frees
    /// memory.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        let before = entries.by_url.len();
        entries.by_url.retain(|_, entry| match entry {
            Entry::Pending { .. } => true,
            Entry::Ready { completed_at, .. } => now.saturating_duration_since(*completed_at) < ttl,
        });
        before - entries.by_url.len()
    }

    pub fn len(&self) -> usize {
        self.lock().by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_fetch(&self, entries: &mut Entries, url: &str) -> SharedOutcome {
        let id = entries.next_id;
        entries.next_id += 1;

        tracing::debug!(url = %url, "OGP cache miss, fetching");

        let task = {
            let table = Arc::clone(&self.entries);
            let fetcher = Arc::clone(&self.fetcher);
            let clock = Arc::clone(&self.clock);
            let url = url.to_string();
            tokio::spawn(async move {
                let outcome = Arc::new(fetcher.fetch(&url).await);
                let mut entries = table.lock().unwrap_or_else(PoisonError::into_inner);
                settle(&mut entries, &url, id, &outcome, clock.now());
                outcome
            })
        };

        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                tracing::error!(error = ?e, "OGP fetch task failed");
                Arc::new(Err(FetchError::network("OGP fetch task failed")))
            })
        }
        .boxed()
        .shared();

        entries.by_url.insert(
            url.to_string(),
            Entry::Pending {
                id,
                outcome: outcome.clone(),
                invalidated: false,
            },
        );
        outcome
    }
}

/// Move the pending entry `id` for `url` to `Ready`, or drop it if it was
/// invalidated while in flight. Entries belonging to another fetch are left alone.
fn settle(entries: &mut Entries, url: &str, id: u64, outcome: &Arc<FetchOutcome>, now: Instant) {
    let invalidated = match entries.by_url.get(url) {
        Some(Entry::Pending {
            id: pending_id,
            invalidated,
            ..
        }) if *pending_id == id => *invalidated,
        _ => return,
    };

    if invalidated {
        entries.by_url.remove(url);
    } else {
        entries.by_url.insert(
            url.to_string(),
            Entry::Ready {
                outcome: Arc::clone(outcome),
                completed_at: now,
            },
        );
    }
}
