mod api;
mod cache;
mod data_sources;
mod dataset;
mod rate_limit;
mod webhooks;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cache::{MemoryBudget, ResponseCache};
use crate::data_sources::{FileSource, HttpSource, RecordSource};
use crate::dataset::DatasetStore;
use crate::rate_limit::RateLimiter;
use crate::webhooks::WebhookConfig;

#[derive(Clone)]
struct AppState {
    dataset: Arc<DatasetStore>,
    source: Arc<dyn RecordSource>,
    cache: Arc<Mutex<ResponseCache>>,
    reload_lock: Arc<tokio::sync::Mutex<()>>,
    config: Arc<ServerConfig>,
}

#[derive(Clone, Debug)]
struct ServerConfig {
    addr: SocketAddr,
    records_path: Option<PathBuf>,
    upstream_url: Option<String>,
    upstream_page_size: usize,
    upstream_max_pages: usize,
    cache_max_bytes: usize,
    rate_limit_per_second: f64,
    page_size_max: usize,
    webhook: WebhookConfig,
}

impl ServerConfig {
    fn from_env() -> Result<Self, String> {
        let raw_addr = env::var("PROVMAP_ADDR").unwrap_or_else(|_| "127.0.0.1:9200".to_string());
        let addr = raw_addr
            .parse()
            .map_err(|e| format!("invalid PROVMAP_ADDR {raw_addr:?}: {e}"))?;

        Ok(Self {
            addr,
            records_path: env_var_nonempty("PROVMAP_RECORDS_PATH").map(PathBuf::from),
            upstream_url: env_var_nonempty("PROVMAP_UPSTREAM_URL"),
            upstream_page_size: env_var_usize("PROVMAP_UPSTREAM_PAGE_SIZE", 500),
            upstream_max_pages: env_var_usize("PROVMAP_UPSTREAM_MAX_PAGES", 200),
            cache_max_bytes: env_var_usize("PROVMAP_CACHE_MAX_BYTES", 64 * 1024 * 1024),
            rate_limit_per_second: env_var_f64("PROVMAP_RATE_LIMIT_PER_SECOND", 20.0),
            page_size_max: env_var_usize("PROVMAP_PAGE_SIZE_MAX", 200),
            webhook: WebhookConfig {
                max_payload_size: env_var_usize("PROVMAP_WEBHOOK_MAX_BYTES", 1024 * 1024),
                secret: env_var_nonempty("PROVMAP_WEBHOOK_SECRET"),
            },
        })
    }

    /// The upstream API wins over a local file when both are set.
    fn record_source(&self) -> Result<Arc<dyn RecordSource>, String> {
        if let Some(url) = &self.upstream_url {
            return Ok(Arc::new(HttpSource::new(
                url.clone(),
                self.upstream_page_size,
                self.upstream_max_pages,
            )));
        }
        if let Some(path) = &self.records_path {
            return Ok(Arc::new(FileSource::new(path)));
        }
        Err("set PROVMAP_UPSTREAM_URL or PROVMAP_RECORDS_PATH".to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = ServerConfig::from_env()?;
    let source = config.record_source()?;
    let addr = config.addr;
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_second));

    let state = AppState {
        dataset: Arc::new(DatasetStore::new(Vec::new())),
        source,
        cache: Arc::new(Mutex::new(ResponseCache::new(MemoryBudget::new(
            config.cache_max_bytes,
        )))),
        reload_lock: Arc::new(tokio::sync::Mutex::new(())),
        config: Arc::new(config),
    };

    // A failed first load still lets the server come up; the next CMS
    // webhook retries.
    match webhooks::reload(&state).await {
        Ok(_) => info!(
            source = state.source.name(),
            records = state.dataset.snapshot().records.len(),
            "initial dataset loaded"
        ),
        Err(e) => warn!(source = state.source.name(), "initial load failed: {e}"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let limited = Router::new()
        .route("/api/records", get(api::get_records))
        .route("/api/arcs", get(api::get_arcs))
        .route("/api/arcs/cluster", get(api::get_cluster))
        .route("/api/aggregates", get(api::get_aggregates))
        .route("/api/summary", get(api::get_summary))
        .route("/api/export.csv", get(api::get_export))
        .route("/webhooks/cms", post(webhooks::cms_webhook))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit,
        ));

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .merge(limited)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind {addr}: {e}"))?;
    info!("provmap server listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| format!("serve: {e}"))
}

fn env_var_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::ServerConfig;
    use crate::webhooks::WebhookConfig;
    use std::path::PathBuf;

    fn config() -> ServerConfig {
        ServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            records_path: None,
            upstream_url: None,
            upstream_page_size: 500,
            upstream_max_pages: 200,
            cache_max_bytes: 1024,
            rate_limit_per_second: 20.0,
            page_size_max: 200,
            webhook: WebhookConfig::default(),
        }
    }

    #[test]
    fn a_record_source_is_required() {
        assert!(config().record_source().is_err());
    }

    #[test]
    fn upstream_takes_precedence_over_file() {
        let mut cfg = config();
        cfg.records_path = Some(PathBuf::from("records.json"));
        assert_eq!(
            cfg.record_source().unwrap().name(),
            "file:records.json"
        );

        cfg.upstream_url = Some("https://cms.example.org/api/objects".to_string());
        assert_eq!(
            cfg.record_source().unwrap().name(),
            "http:https://cms.example.org/api/objects"
        );
    }
}
