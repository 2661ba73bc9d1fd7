//! Tiered Cache
//!
//! Key/value store with per-entry expiry and de-duplicated population.
//!
//! Each key owns a slot that is either `Ready` (a value plus its expiry
//! instant) or `Populating` (a weak handle on the single outstanding
//! population). A missing slot is the empty state. Expiry is checked lazily
//! on access; there is no background sweeper.
//!
//! The slot never keeps a population alive on its own: callers awaiting it
//! hold the strong handles, and once the last one is dropped the population
//! is cancelled and the next caller starts a fresh one.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

type Population<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;
type PopulationHandle<V, E> = WeakShared<BoxFuture<'static, Result<V, E>>>;

// =============================================================================
// Slots
// =============================================================================

#[derive(Debug, Clone)]
struct Ready<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Ready<V> {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

enum Slot<V, E> {
    Ready(Ready<V>),
    Populating {
        generation: u64,
        pending: PopulationHandle<V, E>,
        /// Previous value, readable through `peek` until the new one lands
        stale: Option<Ready<V>>,
    },
}

enum Found<V, E> {
    Hit(V),
    Join(Population<V, E>),
    /// No live value and nobody populating; carries the value to keep for `peek`
    Claim(Option<Ready<V>>),
}

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A live entry was returned without populating
    Hit,
    /// The caller waited on a population claimed by someone else
    Joined,
    /// The caller claimed and drove a new population
    Populated,
}

impl Lookup {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Hit => "hit",
            Lookup::Joined => "joined",
            Lookup::Populated => "populated",
        }
    }
}

// =============================================================================
// Tiered Cache
// =============================================================================

/// Cache tier with lazy expiry and single-flight population per key.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct TieredCache<K, V, E> {
    name: &'static str,
    entries: Arc<DashMap<K, Slot<V, E>>>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
}

impl<K, V, E> TieredCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty tier
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
        }
    }

    /// Tier name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the live value for `key`, populating it on a miss.
    ///
    /// Concurrent callers for the same key share one population and all see
    /// its outcome. Failures are never stored.
    pub async fn get_or_populate<F, Fut>(&self, key: K, ttl: Duration, populate: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.lookup_or_populate(key, ttl, populate).await.1
    }

    /// Same as [`get_or_populate`](Self::get_or_populate), also reporting
    /// how the lookup was satisfied.
    pub async fn lookup_or_populate<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        populate: F,
    ) -> (Lookup, Result<V, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        // The shard guard must be released before awaiting: the population
        // writes its result back into the same map.
        let (lookup, pending) = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let found = match occupied.get() {
                    Slot::Ready(ready) if !ready.is_expired() => Found::Hit(ready.value.clone()),
                    Slot::Ready(ready) => Found::Claim(Some(ready.clone())),
                    Slot::Populating { pending, stale, .. } => match pending.upgrade() {
                        Some(pending) => Found::Join(pending),
                        // Every caller of that population went away
                        None => Found::Claim(stale.clone()),
                    },
                };

                match found {
                    Found::Hit(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        trace!(tier = self.name, ?key, "cache hit");
                        return (Lookup::Hit, Ok(value));
                    }
                    Found::Join(pending) => (Lookup::Joined, pending),
                    Found::Claim(stale) => {
                        let (slot, pending) = self.claim(key.clone(), ttl, populate(), stale);
                        match slot {
                            Some(slot) => {
                                occupied.insert(slot);
                            }
                            None => {
                                occupied.remove();
                            }
                        }
                        (Lookup::Populated, pending)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (slot, pending) = self.claim(key.clone(), ttl, populate(), None);
                if let Some(slot) = slot {
                    vacant.insert(slot);
                }
                (Lookup::Populated, pending)
            }
        };

        match lookup {
            Lookup::Joined => {
                self.joins.fetch_add(1, Ordering::Relaxed);
                trace!(tier = self.name, ?key, "joining in-flight population");
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(tier = self.name, ?key, "cache miss, populating");
            }
        }

        (lookup, pending.await)
    }

    /// Build the slot and shared future for a fresh population.
    ///
    /// Whoever polls the future to completion writes the outcome back, so a
    /// population outlives its claimant as long as another caller still
    /// awaits it. The slot is `None` only if the future already finished.
    fn claim<Fut>(
        &self,
        key: K,
        ttl: Duration,
        work: Fut,
        stale: Option<Ready<V>>,
    ) -> (Option<Slot<V, E>>, Population<V, E>)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entries = Arc::clone(&self.entries);

        let pending = async move {
            let result = work.await;

            if let Entry::Occupied(mut occupied) = entries.entry(key) {
                let owned = matches!(
                    occupied.get(),
                    Slot::Populating { generation: g, .. } if *g == generation
                );
                // Invalidated or cleared mid-flight: leave the slot alone.
                if owned {
                    match &result {
                        Ok(value) => {
                            occupied.insert(Slot::Ready(Ready {
                                value: value.clone(),
                                expires_at: Instant::now() + ttl,
                            }));
                        }
                        Err(_) => {
                            occupied.remove();
                        }
                    }
                }
            }

            result
        }
        .boxed()
        .shared();

        let slot = pending.downgrade().map(|handle| Slot::Populating {
            generation,
            pending: handle,
            stale,
        });
        (slot, pending)
    }

    /// Last fully-populated value for `key`, live or stale.
    ///
    /// Never triggers a population.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|slot| match slot.value() {
            Slot::Ready(ready) => Some(ready.value.clone()),
            Slot::Populating { stale, .. } => stale.as_ref().map(|ready| ready.value.clone()),
        })
    }

    /// Drop the entry for `key`; an in-flight population will not be stored
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove expired ready entries and abandoned populations, returning how
    /// many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot {
            Slot::Ready(ready) => !ready.is_expired(),
            Slot::Populating { pending, .. } => pending.upgrade().is_some(),
        });
        before.saturating_sub(self.entries.len())
    }

    /// Number of slots, including expired and populating ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no slot exists
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of tier statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            tier: self.name,
            total_entries: 0,
            expired_entries: 0,
            populating_entries: 0,
            active_entries: 0,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
        };

        for slot in self.entries.iter() {
            stats.total_entries += 1;
            match slot.value() {
                Slot::Ready(ready) if ready.is_expired() => stats.expired_entries += 1,
                Slot::Ready(_) => stats.active_entries += 1,
                Slot::Populating { pending, .. } if pending.upgrade().is_some() => {
                    stats.populating_entries += 1
                }
                // Abandoned population: as good as expired
                Slot::Populating { .. } => stats.expired_entries += 1,
            }
        }

        stats
    }
}

impl<K: Eq + Hash, V, E> std::fmt::Debug for TieredCache<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub tier: &'static str,
    pub total_entries: usize,
    pub expired_entries: usize,
    pub populating_entries: usize,
    pub active_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
}
