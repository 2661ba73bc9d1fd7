//! bestnews - Ranked Best Stories Service
//!
//! Serves the top N "best" stories from the Hacker News API, ranked by
//! score. Candidate ids and item details are cached in two independent
//! in-memory tiers, item retrievals fan out under a shared concurrency
//! limit, and partial upstream failure shrinks the result instead of
//! failing the request.
//!
//! # Architecture
//!
//! ```text
//! HTTP API → BoundedAggregator → TieredCache (ids, items) → HackerNewsClient
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Upstream adapters implementing domain ports
//! - [`cache`] - Tiered in-memory cache with single-flight population
//! - [`config`] - Service configuration
//! - [`domain`] - Upstream record type and the `StorySource` port
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus instrumentation
//! - [`ranking`] - Bounded fan-out aggregation and story projection
//! - [`server`] - HTTP API

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ranking;
pub mod server;

// Re-export commonly used types
pub use adapters::HackerNewsClient;
pub use cache::TieredCache;
pub use config::ServiceConfig;
pub use domain::{ItemId, ItemRecord, StorySource};
pub use error::{Error, FetchError, Result};
pub use metrics::ServiceMetrics;
pub use ranking::{BoundedAggregator, RankedStory};
