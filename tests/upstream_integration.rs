//! bestnews Integration Tests
//!
//! Exercises the real HTTP client, the aggregator and the HTTP API against
//! an in-process fake of the Hacker News API.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use assert_matches::assert_matches;
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use bestnews::server::{self, AppState, REQUEST_ID_HEADER};
use bestnews::{
    BoundedAggregator, FetchError, HackerNewsClient, ServiceConfig, ServiceMetrics, StorySource,
};

// =============================================================================
// Fake upstream
// =============================================================================

#[derive(Default)]
struct Upstream {
    hits: DashMap<String, usize>,
}

impl Upstream {
    fn hits(&self, path: &str) -> usize {
        self.hits.get(path).map(|h| *h).unwrap_or(0)
    }
}

async fn upstream_handler(
    state: Arc<Upstream>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    *state.hits.entry(path.clone()).or_insert(0) += 1;

    let (status, body) = match path.as_str() {
        "/v0/beststories.json" => (StatusCode::OK, "[1,2,3,4,5]"),
        "/v0/item/1.json" => (
            StatusCode::OK,
            r#"{"by":"alice","descendants":3,"id":1,"score":100,"time":1700000000,"title":"One","type":"story","url":"https://one.example"}"#,
        ),
        "/v0/item/2.json" => (
            StatusCode::OK,
            r#"{"by":"bob","descendants":9,"id":2,"score":200,"time":1700000100,"title":"Two","type":"story"}"#,
        ),
        "/v0/item/3.json" => (StatusCode::OK, "null"),
        "/v0/item/4.json" => (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        "/v0/item/5.json" => (StatusCode::OK, "<html>not json</html>"),
        "/broken/beststories.json" => (StatusCode::OK, r#"{"ids":[1]}"#),
        "/null/beststories.json" => (StatusCode::OK, "null"),
        _ => (StatusCode::NOT_FOUND, "not found"),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    Ok(response)
}

async fn spawn_upstream() -> (SocketAddr, Arc<Upstream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = Arc::new(Upstream::default());

    let shared = Arc::clone(&upstream);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = Arc::clone(&shared);
            tokio::spawn(async move {
                let service = service_fn(move |req| upstream_handler(Arc::clone(&state), req));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, upstream)
}

fn config_for(addr: SocketAddr) -> ServiceConfig {
    ServiceConfig {
        best_stories_url: format!("http://{}/v0/beststories.json", addr),
        item_url_template: format!("http://{}/v0/item/{{id}}.json", addr),
        ..Default::default()
    }
}

// =============================================================================
// HackerNewsClient
// =============================================================================

mod client_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_id_list() {
        let (addr, upstream) = spawn_upstream().await;
        let client = HackerNewsClient::new(&config_for(addr)).unwrap();

        let ids = assert_ok!(client.fetch_id_list().await);

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(upstream.hits("/v0/beststories.json"), 1);
        assert!(client.is_healthy());
    }

    #[tokio::test]
    async fn test_fetch_item_decodes_record() {
        let (addr, _) = spawn_upstream().await;
        let client = HackerNewsClient::new(&config_for(addr)).unwrap();

        let item = assert_ok!(client.fetch_item(1).await);

        assert_eq!(item.id, 1);
        assert_eq!(item.by.as_deref(), Some("alice"));
        assert_eq!(item.score, Some(100));
        assert_eq!(item.url.as_deref(), Some("https://one.example"));
    }

    #[tokio::test]
    async fn test_fetch_item_failure_taxonomy() {
        let (addr, _) = spawn_upstream().await;
        let client = HackerNewsClient::new(&config_for(addr)).unwrap();

        assert_matches!(client.fetch_item(3).await, Err(FetchError::NotFound { id: 3 }));
        assert_matches!(
            client.fetch_item(4).await,
            Err(FetchError::Status { status: 500, .. })
        );
        assert_matches!(client.fetch_item(5).await, Err(FetchError::Decode { .. }));
        // Unknown route answers 404
        assert_matches!(client.fetch_item(99).await, Err(FetchError::NotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_malformed_id_list_marks_unhealthy() {
        let (addr, _) = spawn_upstream().await;
        let config = ServiceConfig {
            best_stories_url: format!("http://{}/broken/beststories.json", addr),
            ..config_for(addr)
        };
        let client = HackerNewsClient::new(&config).unwrap();

        let result = client.fetch_id_list().await;

        assert_matches!(assert_err!(result), FetchError::Decode { .. });
        assert!(!client.is_healthy());
    }

    #[tokio::test]
    async fn test_missing_id_list_is_status_error() {
        let (addr, _) = spawn_upstream().await;
        let config = ServiceConfig {
            best_stories_url: format!("http://{}/missing.json", addr),
            ..config_for(addr)
        };
        let client = HackerNewsClient::new(&config).unwrap();

        let result = client.fetch_id_list().await;

        assert_matches!(assert_err!(result), FetchError::Status { status: 404, .. });
        assert!(!client.is_healthy());
    }

    #[tokio::test]
    async fn test_null_id_list_is_decode_error() {
        let (addr, _) = spawn_upstream().await;
        let config = ServiceConfig {
            best_stories_url: format!("http://{}/null/beststories.json", addr),
            ..config_for(addr)
        };
        let client = HackerNewsClient::new(&config).unwrap();

        let result = client.fetch_id_list().await;

        assert_matches!(assert_err!(result), FetchError::Decode { reason, .. } if reason.contains("null"));
    }
}

// =============================================================================
// Aggregator over the real client
// =============================================================================

mod aggregator_tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_upstream_failure_is_absorbed() {
        let (addr, upstream) = spawn_upstream().await;
        let config = config_for(addr);
        let client = Arc::new(HackerNewsClient::new(&config).unwrap());
        let metrics = Arc::new(ServiceMetrics::new().unwrap());
        let aggregator = BoundedAggregator::new(&config, client, metrics);

        let stories = aggregator.get_top_n(5).await;

        let ids: Vec<u64> = stories.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(stories[0].author, "bob");
        assert_eq!(stories[0].url, "");
        assert_eq!(stories[1].comments, 3);

        // Second call inside both TTLs: list and good items come from cache
        aggregator.get_top_n(5).await;
        assert_eq!(upstream.hits("/v0/beststories.json"), 1);
        assert_eq!(upstream.hits("/v0/item/1.json"), 1);
        // Failures are retried
        assert_eq!(upstream.hits("/v0/item/4.json"), 2);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_yields_empty() {
        let config = ServiceConfig {
            best_stories_url: "http://127.0.0.1:9/v0/beststories.json".into(),
            item_url_template: "http://127.0.0.1:9/v0/item/{id}.json".into(),
            ..Default::default()
        };
        let client = Arc::new(HackerNewsClient::new(&config).unwrap());
        let metrics = Arc::new(ServiceMetrics::new().unwrap());
        let aggregator = BoundedAggregator::new(&config, client, metrics);

        assert!(aggregator.get_top_n(5).await.is_empty());
        assert!(!aggregator.is_upstream_healthy());
    }
}

// =============================================================================
// HTTP API
// =============================================================================

mod server_tests {
    use super::*;

    #[tokio::test]
    async fn test_best_stories_endpoint() {
        let (upstream_addr, _) = spawn_upstream().await;
        let config = config_for(upstream_addr);
        let client = Arc::new(HackerNewsClient::new(&config).unwrap());
        let metrics = Arc::new(ServiceMetrics::new().unwrap());
        let aggregator = BoundedAggregator::new(&config, client, metrics);
        let state = AppState::new(&config, aggregator);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(server::serve(listener, state, shutdown.clone()));

        let http = reqwest::Client::new();

        let response = http
            .get(format!("http://{}/api/HackerNews?n=2", api_addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body[0]["id"], 2);
        assert_eq!(body[0]["title"], "Two");
        assert_eq!(body[1]["id"], 1);
        assert_eq!(body[1]["time"], "2023-11-14T22:13:20Z");

        let response = http
            .get(format!("http://{}/api/hackernews?n=0", api_addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        assert_eq!(response.text().await.unwrap(), "n must be between 1 and 100");

        let response = http
            .get(format!("http://{}/readyz", api_addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        shutdown.cancel();
        assert_ok!(server.await.unwrap());
    }
}
