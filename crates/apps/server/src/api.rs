//! JSON and CSV endpoints over the current dataset.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use foundation::{canonical_f64, ViewBounds};
use http::{header, HeaderValue, StatusCode};
use provenance::{
    aggregate_by, cluster_arcs, export, filter_arcs_by_bounds, select_arcs, summarize,
    EngineError, Granularity, GroupKey, MapArc, Record, SelectionPlan,
    DEFAULT_BOUNDS_PADDING_DEG,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::cache::{CacheKey, CacheStats};
use crate::dataset::Dataset;
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 50;

/// API error mapped onto an HTTP status with a `{ "error": ... }` body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidArgument(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Internal(msg) => {
                error!("{msg}");
                "Internal error".to_string()
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Unparsable numbers become NaN and are then handled by the engine's
/// non-finite fallbacks. Missing or blank values are `None`.
fn lenient_f64(raw: Option<&str>) -> Option<f64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    Some(raw.parse().unwrap_or(f64::NAN))
}

fn parse_usize(raw: Option<&str>, what: &str) -> Result<Option<usize>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {what}: {s:?}"))),
    }
}

/// Negative caps mean uncapped, same as zero.
fn parse_max_arcs(raw: Option<&str>) -> Result<usize, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(s) => s
            .parse::<i64>()
            .map(|v| usize::try_from(v).unwrap_or(0))
            .map_err(|_| ApiError::BadRequest(format!("invalid max_arcs: {s:?}"))),
    }
}

fn is_truthy(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Returns the `[start, end)` slice for a 1-based page.
pub fn paginate(total: usize, page: usize, page_size: usize) -> (usize, usize) {
    let start = page.saturating_sub(1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    (start, end)
}

fn json_body<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|e| ApiError::Internal(format!("serialize response: {e}")))
}

fn json_response(body: Bytes, cache_status: &'static str) -> Response {
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(cache_status));
    response
}

/// Serve `request` from the response cache, rendering it on a blocking
/// thread on a miss.
async fn cached_json<F>(state: &AppState, request: String, render: F) -> Result<Response, ApiError>
where
    F: FnOnce(&Dataset) -> Result<Vec<u8>, ApiError> + Send + 'static,
{
    let dataset = state.dataset.snapshot();
    let key = CacheKey::new(dataset.version, request);

    if let Some(body) = state.cache.lock().get(&key) {
        return Ok(json_response(body, "hit"));
    }

    let body = tokio::task::spawn_blocking(move || render(&dataset))
        .await
        .map_err(|e| ApiError::Internal(format!("render task failed: {e}")))??;
    let body = Bytes::from(body);

    // The version is read under the cache lock: a reload bumps it before
    // taking the lock to invalidate.
    let stored = {
        let mut cache = state.cache.lock();
        let current = state.dataset.snapshot().version;
        cache.insert_if_current(key, body.clone(), current)
    };
    match stored {
        Some(evicted) if !evicted.is_empty() => {
            debug!(evicted = evicted.len(), "response cache eviction");
        }
        Some(_) => {}
        None => debug!("dataset reloaded during render; response not cached"),
    }
    Ok(json_response(body, "miss"))
}

pub async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    page: Option<String>,
    page_size: Option<String>,
    q: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordsPage<'a> {
    page: usize,
    page_size: usize,
    total: usize,
    version: u64,
    records: Vec<&'a Record>,
}

pub async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Result<Response, ApiError> {
    let page = parse_usize(query.page.as_deref(), "page")?
        .unwrap_or(1)
        .max(1);
    let page_size = parse_usize(query.page_size.as_deref(), "page_size")?
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, state.config.page_size_max.max(1));
    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .unwrap_or_default();

    let dataset = state.dataset.snapshot();
    let matching: Vec<&Record> = dataset
        .records
        .iter()
        .filter(|r| r.matches_query(&needle))
        .collect();
    let (start, end) = paginate(matching.len(), page, page_size);

    let body = json_body(&RecordsPage {
        page,
        page_size,
        total: matching.len(),
        version: dataset.version,
        records: matching[start..end].to_vec(),
    })?;
    Ok(json_response(Bytes::from(body), "bypass"))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArcsQuery {
    zoom: Option<String>,
    north: Option<String>,
    south: Option<String>,
    east: Option<String>,
    west: Option<String>,
    padding: Option<String>,
}

/// Normalised view parameters for arc selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcView {
    pub zoom: f64,
    pub bounds: Option<ViewBounds>,
    pub padding: f64,
}

impl ArcView {
    /// Zoom defaults to 0. Bounds are used only when all four edges are
    /// given.
    pub fn from_query(query: &ArcsQuery) -> Self {
        let edge = |v: &Option<String>| lenient_f64(v.as_deref());
        let bounds = match (
            edge(&query.north),
            edge(&query.south),
            edge(&query.east),
            edge(&query.west),
        ) {
            (Some(n), Some(s), Some(e), Some(w)) => Some(ViewBounds::new(n, s, e, w)),
            _ => None,
        };
        Self {
            zoom: lenient_f64(query.zoom.as_deref()).unwrap_or(0.0),
            bounds,
            padding: lenient_f64(query.padding.as_deref()).unwrap_or(DEFAULT_BOUNDS_PADDING_DEG),
        }
    }

    /// Canonical request string used in cache keys.
    pub fn cache_request(&self) -> String {
        let f = |v: f64| canonical_f64(v).to_string();
        match &self.bounds {
            Some(b) => format!(
                "arcs;z={};n={};s={};e={};w={};p={}",
                f(self.zoom),
                f(b.north),
                f(b.south),
                f(b.east),
                f(b.west),
                f(self.padding)
            ),
            None => format!("arcs;z={}", f(self.zoom)),
        }
    }

    pub fn arcs<'a>(&self, records: &'a [Record]) -> Vec<MapArc<'a>> {
        let arcs = select_arcs(records, self.zoom, self.bounds.as_ref());
        match &self.bounds {
            Some(b) => filter_arcs_by_bounds(arcs, b, self.padding),
            None => arcs,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArcsResponse<'a> {
    version: u64,
    plan: SelectionPlan,
    arcs: Vec<MapArc<'a>>,
}

pub async fn get_arcs(
    State(state): State<AppState>,
    Query(query): Query<ArcsQuery>,
) -> Result<Response, ApiError> {
    let view = ArcView::from_query(&query);
    cached_json(&state, view.cache_request(), move |dataset| {
        json_body(&ArcsResponse {
            version: dataset.version,
            plan: SelectionPlan::for_zoom(view.zoom),
            arcs: view.arcs(&dataset.records),
        })
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterQuery {
    granularity: Option<String>,
    max_arcs: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterResponse<'a> {
    version: u64,
    granularity: Granularity,
    max_arcs: usize,
    arcs: Vec<MapArc<'a>>,
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> Result<Response, ApiError> {
    let granularity: Granularity = match query.granularity.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw.parse()?,
        _ => Granularity::Object,
    };
    let max_arcs = parse_max_arcs(query.max_arcs.as_deref())?;

    let request = format!("cluster;g={granularity};k={max_arcs}");
    cached_json(&state, request, move |dataset| {
        json_body(&ClusterResponse {
            version: dataset.version,
            granularity,
            max_arcs,
            arcs: cluster_arcs(dataset.records.iter(), granularity, max_arcs),
        })
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct AggregatesQuery {
    by: Option<String>,
}

pub async fn get_aggregates(
    State(state): State<AppState>,
    Query(query): Query<AggregatesQuery>,
) -> Result<Response, ApiError> {
    let key: GroupKey = match query.by.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw.parse()?,
        _ => GroupKey::OriginCountry,
    };

    cached_json(&state, format!("aggregates;by={}", key.as_str()), move |dataset| {
        json_body(&aggregate_by(dataset.records.iter(), key))
    })
    .await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    #[serde(flatten)]
    summary: provenance::Summary,
    version: u64,
    content_hash: String,
    cache: CacheStats,
}

pub async fn get_summary(State(state): State<AppState>) -> Result<Response, ApiError> {
    let dataset = state.dataset.snapshot();
    let cache = state.cache.lock().stats();
    let records = Arc::clone(&dataset.records);
    let summary = tokio::task::spawn_blocking(move || summarize(records.iter()))
        .await
        .map_err(|e| ApiError::Internal(format!("summary task failed: {e}")))?;

    let body = json_body(&SummaryResponse {
        summary,
        version: dataset.version,
        content_hash: dataset.content_hash.clone(),
        cache,
    })?;
    Ok(json_response(Bytes::from(body), "bypass"))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    arcs: Option<String>,
    zoom: Option<String>,
    north: Option<String>,
    south: Option<String>,
    east: Option<String>,
    west: Option<String>,
    padding: Option<String>,
}

impl ExportQuery {
    fn view(&self) -> ArcView {
        ArcView::from_query(&ArcsQuery {
            zoom: self.zoom.clone(),
            north: self.north.clone(),
            south: self.south.clone(),
            east: self.east.clone(),
            west: self.west.clone(),
            padding: self.padding.clone(),
        })
    }
}

pub async fn get_export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let dataset = state.dataset.snapshot();
    let want_arcs = is_truthy(query.arcs.as_deref());
    let view = query.view();

    let csv = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        if want_arcs {
            export::write_arcs_csv(&view.arcs(&dataset.records), &mut out)?;
        } else {
            export::write_records_csv(dataset.records.iter(), &mut out)?;
        }
        Ok(out)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("export task failed: {e}")))??;

    let filename = if want_arcs { "arcs.csv" } else { "records.csv" };
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}
