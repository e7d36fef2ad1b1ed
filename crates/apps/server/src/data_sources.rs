//! Record source abstraction.
//!
//! This module defines the `RecordSource` trait and its implementations:
//! - Local JSON file (an array of records)
//! - Remote paginated HTTP API
//!
//! The server loads the full record set once at start-up and again on every
//! CMS revalidation; the arc engine then works on the in-memory copy.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use provenance::{Record, records_from_json, records_from_slice};
use serde_json::Value;
use tracing::debug;

/// Error type for record source operations.
#[derive(Debug)]
pub struct DataSourceError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DataSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl DataSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for record providers.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait RecordSource: Send + Sync {
    /// Human-readable description for logs.
    fn name(&self) -> &str;

    /// Fetch the complete record set.
    fn load(&self) -> BoxFuture<'_, Result<Vec<Record>, DataSourceError>>;
}

/// JSON file holding an array of records.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("file:{}", path.display()),
            path,
        }
    }
}

impl RecordSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> BoxFuture<'_, Result<Vec<Record>, DataSourceError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
                DataSourceError::with_source(format!("failed to read {:?}", self.path), e)
            })?;
            records_from_slice(&bytes)
                .map_err(|e| DataSourceError::with_source("failed to parse records", e))
        })
    }
}

/// Paginated upstream API.
///
/// Requests `{base}?page=N&page_size=M` starting at page 1. A page body is
/// either a bare array, or an object `{ "results": [...], "next": ... }`.
/// Paging stops on an empty page, a null/missing `next` (or a short bare
/// array), or after `max_pages`.
pub struct HttpSource {
    name: String,
    base_url: String,
    page_size: usize,
    max_pages: usize,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, page_size: usize, max_pages: usize) -> Self {
        let base_url = base_url.into();
        Self {
            name: format!("http:{base_url}"),
            base_url,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            client: reqwest::Client::new(),
        }
    }

    fn page_url(&self, page: usize) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}page={page}&page_size={}",
            self.base_url, self.page_size
        )
    }
}

/// Split a page body into its items and whether another page follows.
pub fn split_page(body: Value, page_size: usize) -> Result<(Value, bool), DataSourceError> {
    match body {
        Value::Array(items) => {
            let more = items.len() >= page_size;
            Ok((Value::Array(items), more))
        }
        Value::Object(mut obj) => {
            let items = obj
                .remove("results")
                .ok_or_else(|| DataSourceError::new("page object has no \"results\" field"))?;
            let more = obj.get("next").is_some_and(|n| !n.is_null());
            Ok((items, more))
        }
        _ => Err(DataSourceError::new(
            "page body is neither an array nor an object",
        )),
    }
}

impl RecordSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> BoxFuture<'_, Result<Vec<Record>, DataSourceError>> {
        Box::pin(async move {
            let mut records = Vec::new();

            for page in 1..=self.max_pages {
                let url = self.page_url(page);
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| DataSourceError::with_source("HTTP request failed", e))?;

                if !resp.status().is_success() {
                    return Err(DataSourceError::new(format!(
                        "HTTP error on page {page}: {}",
                        resp.status()
                    )));
                }

                let body: Value = resp
                    .json()
                    .await
                    .map_err(|e| DataSourceError::with_source("failed to decode page", e))?;
                let (items, more) = split_page(body, self.page_size)?;
                let page_records = records_from_json(&items)
                    .map_err(|e| DataSourceError::with_source(format!("page {page}"), e))?;

                debug!(page, count = page_records.len(), "fetched upstream page");
                let empty = page_records.is_empty();
                records.extend(page_records);
                if empty || !more {
                    break;
                }
            }

            Ok(records)
        })
    }
}
