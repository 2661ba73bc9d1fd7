//! bestnews
//!
//! HTTP service returning the top N Hacker News best stories by score.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          bestnews                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   HTTP API   │───▶│  Aggregator  │───▶│   Upstream   │       │
//! │  │   (hyper)    │    │ + cache tiers│    │   (reqwest)  │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bestnews::error::{Error, Result};
use bestnews::server::{self, AppState};
use bestnews::{BoundedAggregator, HackerNewsClient, ServiceConfig, ServiceMetrics};

// =============================================================================
// CLI Arguments
// =============================================================================

/// bestnews - Top Hacker News best stories ranked by score
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Upstream endpoint returning the best story ids
    #[arg(
        long,
        env = "BEST_STORIES_URL",
        default_value = "https://hacker-news.firebaseio.com/v0/beststories.json"
    )]
    best_stories_url: String,

    /// Upstream item endpoint, `{id}` is replaced by the item id
    #[arg(
        long,
        env = "ITEM_URL_TEMPLATE",
        default_value = "https://hacker-news.firebaseio.com/v0/item/{id}.json"
    )]
    item_url_template: String,

    /// Lifetime of the cached id list in seconds
    #[arg(long, env = "ID_LIST_TTL_SECONDS", default_value = "60")]
    id_list_ttl_seconds: u64,

    /// Lifetime of each cached item in seconds
    #[arg(long, env = "ITEM_TTL_SECONDS", default_value = "300")]
    item_ttl_seconds: u64,

    /// Maximum concurrent upstream item requests
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "5")]
    max_concurrent_requests: usize,

    /// Upstream HTTP timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value = "30")]
    request_timeout_seconds: u64,

    /// Largest number of stories a caller may request
    #[arg(long, env = "MAX_STORIES", default_value = "100")]
    max_stories: usize,

    /// Number of stories returned when the caller does not ask for one
    #[arg(long, env = "DEFAULT_STORIES", default_value = "10")]
    default_stories: usize,

    /// Abort a ranking request after this many seconds (unset = no deadline)
    #[arg(long, env = "REQUEST_DEADLINE_SECONDS")]
    request_deadline_seconds: Option<u64>,

    /// HTTP API bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            best_stories_url: self.best_stories_url.clone(),
            item_url_template: self.item_url_template.clone(),
            id_list_ttl: Duration::from_secs(self.id_list_ttl_seconds),
            item_ttl: Duration::from_secs(self.item_ttl_seconds),
            max_concurrent_requests: self.max_concurrent_requests,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            max_stories: self.max_stories,
            default_stories: self.default_stories,
            request_deadline: self.request_deadline_seconds.map(Duration::from_secs),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = args.service_config();
    config.validate()?;

    info!("Starting bestnews");
    info!("  Best stories URL: {}", config.best_stories_url);
    info!("  Item URL template: {}", config.item_url_template);
    info!(
        "  Cache TTLs: ids {:?}, items {:?}",
        config.id_list_ttl, config.item_ttl
    );
    info!(
        "  Max concurrent requests: {}",
        config.max_concurrent_requests
    );

    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

    let metrics = Arc::new(ServiceMetrics::new()?);
    let client = Arc::new(HackerNewsClient::new(&config)?);
    let aggregator = BoundedAggregator::new(&config, client, metrics);
    let state = AppState::new(&config, aggregator);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    server::run(addr, state, shutdown).await?;

    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |s: &str| -> Result<Directive> {
        s.parse::<Directive>()
            .map_err(|e| Error::Config(format!("Invalid log directive {}: {}", s, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("reqwest=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
