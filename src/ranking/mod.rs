//! Story ranking
//!
//! - [`aggregator`] - bounded fan-out over the two cache tiers
//! - [`assembler`] - projection of upstream records into [`RankedStory`]

pub mod aggregator;
pub mod assembler;

pub use aggregator::{rank, BoundedAggregator, BEST_STORIES_KEY};
pub use assembler::{assemble, RankedStory};
