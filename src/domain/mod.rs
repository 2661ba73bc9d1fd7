//! Domain Layer
//!
//! Holds the upstream record type and the port trait the ranking core
//! depends on.
//!
//! # Usage
//!
//! ```ignore
//! use bestnews::domain::{ItemId, StorySource};
//!
//! async fn first_ids<S: StorySource>(source: &S, n: usize) -> Vec<ItemId> {
//!     source
//!         .fetch_id_list()
//!         .await
//!         .map(|ids| ids.into_iter().take(n).collect())
//!         .unwrap_or_default()
//! }
//! ```

pub mod ports;

pub use ports::{ItemId, ItemRecord, StorySource};
