//! Service configuration
//!
//! Everything the core consumes is supplied from outside: upstream
//! locations, the two cache lifetimes and the upstream courtesy limit.

use std::time::Duration;

use crate::error::{Error, Result};

/// Placeholder substituted with the item id in [`ServiceConfig::item_url_template`]
pub const ITEM_ID_PLACEHOLDER: &str = "{id}";

/// Configuration for the ranking service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Endpoint returning the candidate ID list
    pub best_stories_url: String,

    /// Item endpoint, with `{id}` in place of the item id
    pub item_url_template: String,

    /// Lifetime of the cached candidate ID list
    pub id_list_ttl: Duration,

    /// Lifetime of each cached item
    pub item_ttl: Duration,

    /// Maximum simultaneous in-flight item retrievals
    pub max_concurrent_requests: usize,

    /// Per-request HTTP timeout towards the upstream
    pub request_timeout: Duration,

    /// Largest `n` accepted by the HTTP adapter
    pub max_stories: usize,

    /// `n` used when the caller does not supply one
    pub default_stories: usize,

    /// Optional deadline applied to every ranking request
    pub request_deadline: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            best_stories_url: "https://hacker-news.firebaseio.com/v0/beststories.json".to_string(),
            item_url_template: "https://hacker-news.firebaseio.com/v0/item/{id}.json".to_string(),
            id_list_ttl: Duration::from_secs(60),
            item_ttl: Duration::from_secs(300),
            max_concurrent_requests: 5,
            request_timeout: Duration::from_secs(30),
            max_stories: 100,
            default_stories: 10,
            request_deadline: None,
        }
    }
}

impl ServiceConfig {
    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.best_stories_url.trim().is_empty() {
            return Err(Error::Config("best_stories_url cannot be empty".into()));
        }
        if !self.item_url_template.contains(ITEM_ID_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "item_url_template must contain {}: {}",
                ITEM_ID_PLACEHOLDER, self.item_url_template
            )));
        }
        if self.id_list_ttl.is_zero() || self.item_ttl.is_zero() {
            return Err(Error::Config("cache TTLs must be greater than zero".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        if self.max_stories == 0 {
            return Err(Error::Config("max_stories must be at least 1".into()));
        }
        if self.default_stories == 0 || self.default_stories > self.max_stories {
            return Err(Error::Config(format!(
                "default_stories must be between 1 and {}",
                self.max_stories
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();

        assert_eq!(config.id_list_ttl, Duration::from_secs(60));
        assert_eq!(config.item_ttl, Duration::from_secs(300));
        assert_eq!(config.max_concurrent_requests, 5);
        assert_eq!(config.max_stories, 100);
        assert_eq!(config.default_stories, 10);
        assert!(config.request_deadline.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let config = ServiceConfig {
            item_url_template: "http://localhost/item.json".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let zero_ttl = ServiceConfig {
            item_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert_matches!(zero_ttl.validate(), Err(Error::Config(_)));

        let zero_concurrency = ServiceConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert_matches!(zero_concurrency.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_default_above_max() {
        let config = ServiceConfig {
            max_stories: 5,
            default_stories: 10,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("between 1 and 5"));
    }
}
