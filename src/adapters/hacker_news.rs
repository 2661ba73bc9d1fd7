//! Hacker News Adapter
//!
//! Implements the `StorySource` port against the Hacker News Firebase API.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::{ServiceConfig, ITEM_ID_PLACEHOLDER};
use crate::domain::ports::{ItemId, ItemRecord, StorySource};
use crate::error::{Error, FetchError, FetchResult, Result};

/// HTTP client for the best-stories and item endpoints
pub struct HackerNewsClient {
    client: Client,
    best_stories_url: String,
    item_url_template: String,
    healthy: RwLock<bool>,
}

impl HackerNewsClient {
    /// Create a new client from the service configuration
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            best_stories_url: config.best_stories_url.clone(),
            item_url_template: config.item_url_template.clone(),
            healthy: RwLock::new(true),
        })
    }

    fn item_url(&self, id: ItemId) -> String {
        self.item_url_template
            .replace(ITEM_ID_PLACEHOLDER, &id.to_string())
    }

    /// GET a URL and decode its JSON body.
    ///
    /// A literal `null` body is reported as `Ok(None)`; any non-success
    /// status, 404 included, is a `Status` error.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> FetchResult<Option<T>> {
        debug!("Querying upstream: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;

        serde_json::from_slice::<Option<T>>(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for HackerNewsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HackerNewsClient")
            .field("best_stories_url", &self.best_stories_url)
            .field("item_url_template", &self.item_url_template)
            .finish()
    }
}

#[async_trait]
impl StorySource for HackerNewsClient {
    #[instrument(skip(self))]
    async fn fetch_id_list(&self) -> FetchResult<Vec<ItemId>> {
        let url = self.best_stories_url.as_str();

        let result = match self.get_json::<Vec<ItemId>>(url).await {
            Ok(Some(ids)) => Ok(ids),
            Ok(None) => Err(FetchError::Decode {
                url: url.to_string(),
                reason: "expected an id list, got null".to_string(),
            }),
            Err(e) => Err(e),
        };

        *self.healthy.write() = result.is_ok();
        result
    }

    #[instrument(skip(self))]
    async fn fetch_item(&self, id: ItemId) -> FetchResult<ItemRecord> {
        let url = self.item_url(id);

        match self.get_json::<ItemRecord>(&url).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) | Err(FetchError::Status { status: 404, .. }) => {
                Err(FetchError::NotFound { id })
            }
            Err(e) => Err(e),
        }
    }

    fn is_healthy(&self) -> bool {
        *self.healthy.read()
    }
}
