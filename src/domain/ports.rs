//! Domain Ports (Port/Adapter Pattern)
//!
//! The ranking core depends only on the abstractions in this module.
//! Infrastructure adapters implement them to reach the real upstream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │                     StorySource                      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │                  HackerNewsClient                    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchResult;

// =============================================================================
// Value Objects
// =============================================================================

/// Upstream item identifier
pub type ItemId = u64;

/// One upstream item as decoded from the detail endpoint.
///
/// Every field but `id` may be missing upstream (deleted items, jobs without
/// comments), so they stay optional here and are defaulted on projection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ItemRecord {
    /// Unique item id
    pub id: ItemId,

    /// Story title
    #[serde(default)]
    pub title: Option<String>,

    /// Link target, absent for text posts
    #[serde(default)]
    pub url: Option<String>,

    /// Author username
    #[serde(default)]
    pub by: Option<String>,

    /// Creation time, Unix epoch seconds
    #[serde(default)]
    pub time: Option<i64>,

    /// Popularity score
    #[serde(default)]
    pub score: Option<u32>,

    /// Total comment count
    #[serde(default)]
    pub descendants: Option<u32>,

    /// Item kind ("story", "job", ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Set when the item was deleted
    #[serde(default)]
    pub deleted: bool,

    /// Set when the item was flagged dead
    #[serde(default)]
    pub dead: bool,
}

// =============================================================================
// Story Source Port
// =============================================================================

/// Port for retrieving candidate ids and item details from the upstream.
///
/// Every call is exactly one upstream round trip. Implementations never
/// cache and never substitute defaults for a failed retrieval.
///
/// # Example
///
/// ```ignore
/// struct StaticSource;
///
/// #[async_trait]
/// impl StorySource for StaticSource {
///     async fn fetch_id_list(&self) -> FetchResult<Vec<ItemId>> {
///         Ok(vec![1, 2, 3])
///     }
///
///     async fn fetch_item(&self, id: ItemId) -> FetchResult<ItemRecord> {
///         Err(FetchError::NotFound { id })
///     }
/// }
/// ```
#[async_trait]
pub trait StorySource: Send + Sync {
    /// Fetch the ordered candidate id list.
    async fn fetch_id_list(&self) -> FetchResult<Vec<ItemId>>;

    /// Fetch one item's details.
    ///
    /// Returns `FetchError::NotFound` when the upstream reports the id as
    /// unknown, distinct from transport or decode failures.
    async fn fetch_item(&self, id: ItemId) -> FetchResult<ItemRecord>;

    /// Whether the most recent candidate-list retrieval succeeded.
    fn is_healthy(&self) -> bool {
        true
    }
}
