//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Usage
//!
//! ```ignore
//! use bestnews::adapters::HackerNewsClient;
//! use bestnews::domain::StorySource;
//!
//! let client = HackerNewsClient::new(&config)?;
//! let ids = client.fetch_id_list().await?;
//! ```

mod hacker_news;

pub use hacker_news::HackerNewsClient;
