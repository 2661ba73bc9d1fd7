//! HTTP API
//!
//! Thin hyper front end over [`BoundedAggregator`]:
//!
//! | Route                    | Response                                  |
//! |--------------------------|-------------------------------------------|
//! | `GET /api/HackerNews`    | JSON array of ranked stories (`?n=`)      |
//! | `GET /api/beststories`   | alias of `/api/HackerNews`                |
//! | `GET /healthz`, `/livez` | `ok`                                      |
//! | `GET /readyz`            | `ok`, or 503 when the upstream is failing |
//! | `GET /metrics`           | Prometheus text exposition                |
//!
//! Paths match case-insensitively and ignore a trailing slash. A handler
//! that panics is answered with a 500 JSON error instead of dropping the
//! connection.

use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::ranking::BoundedAggregator;

/// Header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of a 500 raised by the ranking endpoint itself
pub const PROCESSING_ERROR: &str = "An error occurred while processing your request.";

/// Message of the JSON body sent when a handler panics
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred.";

/// Shared state handed to every connection
#[derive(Debug)]
pub struct AppState {
    aggregator: Arc<BoundedAggregator>,
    max_stories: usize,
    default_stories: usize,
    request_deadline: Option<Duration>,
}

impl AppState {
    pub fn new(config: &ServiceConfig, aggregator: Arc<BoundedAggregator>) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            max_stories: config.max_stories,
            default_stories: config.default_stories,
            request_deadline: config.request_deadline,
        })
    }
}

/// Bind `addr` and serve until `shutdown` is cancelled
pub async fn run(addr: SocketAddr, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind HTTP API on {}: {}", addr, e)))?;

    serve(listener, state, shutdown).await
}

/// Serve connections from an already bound listener
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("HTTP API listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP API shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("HTTP API accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, "HTTP API connection error: {}", e);
            }
        });
    }
}

async fn handle(
    state: Arc<AppState>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    drop(req);

    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    let mut response = recover(dispatch(&state, &method, &path, query.as_deref()))
        .instrument(span)
        .await;

    state
        .aggregator
        .metrics()
        .record_http(response.status().as_u16());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    Ok(response)
}

/// Run a handler, answering a panic with the generic 500 JSON error
pub async fn recover<F>(handler: F) -> Response<Full<Bytes>>
where
    F: Future<Output = Response<Full<Bytes>>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(reason = %reason, "Unhandled exception occurred.");

            let body = serde_json::json!({ "error": UNEXPECTED_ERROR });
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
                body.to_string(),
            )
        }
    }
}

/// Route one request
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let route = path.trim_end_matches('/').to_ascii_lowercase();

    match route.as_str() {
        "/api/hackernews" | "/api/beststories" => {
            if *method != Method::GET {
                return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            }
            best_stories(state, query).await
        }
        "/healthz" | "/livez" => text(StatusCode::OK, "ok"),
        "/readyz" => {
            if state.aggregator.is_upstream_healthy() {
                text(StatusCode::OK, "ok")
            } else {
                text(StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable")
            }
        }
        "/metrics" => {
            state.aggregator.publish_cache_metrics();
            match state.aggregator.metrics().encode() {
                Ok((content_type, body)) => {
                    let mut response = respond(StatusCode::OK, "text/plain", body);
                    if let Ok(value) = HeaderValue::from_str(&content_type) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                }
            }
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn best_stories(state: &AppState, query: Option<&str>) -> Response<Full<Bytes>> {
    let n = match parse_count(query, state.default_stories, state.max_stories) {
        Ok(n) => n,
        Err(message) => {
            debug!("Rejected request: {}", message);
            return text(StatusCode::BAD_REQUEST, &message);
        }
    };

    let result = match state.request_deadline {
        Some(deadline) => state.aggregator.get_top_n_within(n, deadline).await,
        None => Ok(state.aggregator.get_top_n(n).await),
    };

    match result {
        Ok(stories) => match serde_json::to_vec(&stories) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!("Failed to serialize stories: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
            }
        },
        Err(Error::DeadlineExceeded(deadline)) => text(
            StatusCode::GATEWAY_TIMEOUT,
            &format!("ranking did not complete within {:?}", deadline),
        ),
        Err(e) => {
            error!("Error occurred while fetching best stories: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR)
        }
    }
}

/// Read `n` from a query string.
///
/// Missing means `default`; anything that is not an integer in
/// `1..=max` is rejected with the message returned to the client.
pub fn parse_count(query: Option<&str>, default: usize, max: usize) -> std::result::Result<usize, String> {
    let invalid = || format!("n must be between 1 and {}", max);

    let raw = query.and_then(|q| {
        q.split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| *key == "n")
            .map(|(_, value)| value)
    });

    let Some(raw) = raw else {
        return Ok(default);
    };

    let decoded = urlencoding::decode(raw).map_err(|_| invalid())?;
    let n: i64 = decoded.trim().parse().map_err(|_| invalid())?;

    if n < 1 || n > max as i64 {
        return Err(invalid());
    }
    Ok(n as usize)
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body.to_string())
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
