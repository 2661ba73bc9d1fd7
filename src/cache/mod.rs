//! In-memory cache tiers
//!
//! The ranking service keeps two independent tiers: the candidate id list
//! (short lifetime) and per-item details (longer lifetime). Both are
//! instances of [`TieredCache`].

mod tiered;

pub use tiered::{CacheStats, Lookup, TieredCache};
