//! Bounded Aggregator
//!
//! Resolves the candidate id list, fans item retrievals out under a shared
//! permit pool, drops whatever failed and ranks the rest by score.
//!
//! # Flow
//!
//! ```text
//! get_top_n(n)
//!   └─ id tier ──miss──▶ StorySource::fetch_id_list
//!   └─ first n ids ──▶ item tier ──miss──▶ [permit] StorySource::fetch_item
//!   └─ assemble ──▶ stable sort by score desc ──▶ truncate n
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use prometheus::IntGauge;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheStats, TieredCache};
use crate::config::ServiceConfig;
use crate::domain::ports::{ItemId, ItemRecord, StorySource};
use crate::error::{Error, FetchError, FetchResult, Result};
use crate::metrics::ServiceMetrics;
use crate::ranking::assembler::{assemble, RankedStory};

/// Cache key of the candidate list in the id tier
pub const BEST_STORIES_KEY: &str = "beststories";

const ID_TIER: &str = "ids";
const ITEM_TIER: &str = "items";

/// Sort by score descending, keeping input order among equal scores, and
/// keep at most `n`.
pub fn rank(mut stories: Vec<RankedStory>, n: usize) -> Vec<RankedStory> {
    // sort_by is stable
    stories.sort_by(|a, b| b.score.cmp(&a.score));
    stories.truncate(n);
    stories
}

/// Holds the in-flight gauge up for as long as a permit is held
struct InFlight(IntGauge);

impl InFlight {
    fn enter(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Ranking engine shared by every request in the process
pub struct BoundedAggregator {
    source: Arc<dyn StorySource>,
    id_list: TieredCache<&'static str, Arc<Vec<ItemId>>, FetchError>,
    items: TieredCache<ItemId, Arc<ItemRecord>, FetchError>,
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
    id_list_ttl: Duration,
    item_ttl: Duration,
    metrics: Arc<ServiceMetrics>,
}

impl BoundedAggregator {
    /// Create an aggregator over `source`
    pub fn new(
        config: &ServiceConfig,
        source: Arc<dyn StorySource>,
        metrics: Arc<ServiceMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            id_list: TieredCache::new(ID_TIER),
            items: TieredCache::new(ITEM_TIER),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            max_concurrent: config.max_concurrent_requests,
            id_list_ttl: config.id_list_ttl,
            item_ttl: config.item_ttl,
            metrics,
        })
    }

    /// Top `n` stories by score.
    ///
    /// Never fails: upstream trouble shrinks the result, down to empty.
    /// `n` is expected to be validated by the caller.
    #[instrument(skip(self))]
    pub async fn get_top_n(&self, n: usize) -> Vec<RankedStory> {
        let ids = match self.candidate_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to retrieve best story ids: {}", e);
                return Vec::new();
            }
        };

        if ids.is_empty() {
            warn!("No best story ids were retrieved");
            return Vec::new();
        }

        // Only the first n upstream positions are eligible, regardless of score.
        let fetches = ids.iter().take(n).map(|&id| self.retrieve(id));
        let fetched = join_all(fetches).await;
        let requested = fetched.len();

        let stories: Vec<RankedStory> = fetched
            .into_iter()
            .flatten()
            .map(|item| assemble(&item))
            .collect();

        if stories.len() < requested {
            info!(
                "Ranked {} of {} requested stories, {} dropped",
                stories.len(),
                requested,
                requested - stories.len()
            );
        } else {
            debug!("Ranked {} stories", stories.len());
        }

        rank(stories, n)
    }

    /// [`get_top_n`](Self::get_top_n) bounded by a caller deadline.
    ///
    /// Work still in flight when the deadline passes is dropped along with
    /// its permits.
    pub async fn get_top_n_within(&self, n: usize, deadline: Duration) -> Result<Vec<RankedStory>> {
        tokio::time::timeout(deadline, self.get_top_n(n))
            .await
            .map_err(|_| {
                warn!("Ranking {} stories exceeded deadline of {:?}", n, deadline);
                Error::DeadlineExceeded(deadline)
            })
    }

    async fn candidate_ids(&self) -> FetchResult<Arc<Vec<ItemId>>> {
        let source = Arc::clone(&self.source);
        let metrics = Arc::clone(&self.metrics);

        let (lookup, result) = self
            .id_list
            .lookup_or_populate(BEST_STORIES_KEY, self.id_list_ttl, move || async move {
                let result = source.fetch_id_list().await;
                metrics.record_upstream("beststories", result.as_ref().err());
                result.map(Arc::new)
            })
            .await;

        self.metrics.record_lookup(ID_TIER, lookup);
        result
    }

    /// Retrieve one item through the item tier; `None` if it could not be
    /// obtained.
    ///
    /// Only the upstream call itself holds a permit. Cache hits and callers
    /// joining another caller's population never occupy the window.
    async fn retrieve(&self, id: ItemId) -> Option<Arc<ItemRecord>> {
        let source = Arc::clone(&self.source);
        let limiter = Arc::clone(&self.limiter);
        let metrics = Arc::clone(&self.metrics);

        let (lookup, result) = self
            .items
            .lookup_or_populate(id, self.item_ttl, move || async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchError::Transport {
                        url: format!("item/{}", id),
                        reason: format!("concurrency limiter unavailable: {}", e),
                    })?;
                let _in_flight = InFlight::enter(metrics.fetches_in_flight());

                let result = source.fetch_item(id).await;
                metrics.record_upstream("item", result.as_ref().err());
                result.map(Arc::new)
            })
            .await;

        self.metrics.record_lookup(ITEM_TIER, lookup);

        match result {
            Ok(item) => Some(item),
            Err(e) => {
                if e.is_not_found() {
                    warn!(id, "Story with id {} not found: {}", id, e);
                } else {
                    error!(id, "Failed to fetch story with id {}: {}", id, e);
                }
                self.metrics.record_dropped(e.kind());
                None
            }
        }
    }

    /// Whether the upstream answered the last id list request
    pub fn is_upstream_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    /// Permits currently free in the limiter
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Configured size of the limiter
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Statistics for both cache tiers
    pub fn cache_stats(&self) -> [CacheStats; 2] {
        [self.id_list.stats(), self.items.stats()]
    }

    /// Push cache gauges into the metrics registry
    pub fn publish_cache_metrics(&self) {
        for stats in self.cache_stats() {
            self.metrics.observe_cache(&stats);
        }
    }

    /// Metrics registry this aggregator reports into
    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}

impl std::fmt::Debug for BoundedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedAggregator")
            .field("max_concurrent", &self.max_concurrent)
            .field("id_list_ttl", &self.id_list_ttl)
            .field("item_ttl", &self.item_ttl)
            .field("id_list", &self.id_list)
            .field("items", &self.items)
            .finish()
    }
}
