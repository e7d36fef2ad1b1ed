//! Per-client token bucket rate limiting.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::RwLock;
use tracing::debug;

/// Buckets idle for this long are full again and can be forgotten.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(60);
const PRUNE_THRESHOLD: usize = 4096;

struct Bucket {
    tokens: f64,
    last_update: Instant,
}

pub struct RateLimiter {
    /// Requests per second; `<= 0` disables limiting.
    rate_per_second: f64,
    buckets: RwLock<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64) -> Self {
        Self {
            rate_per_second,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rate_per_second.is_finite() && self.rate_per_second > 0.0
    }

    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    /// Take one token from `client`'s bucket as of `now`.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let capacity = self.rate_per_second * 2.0;

        let mut buckets = self.buckets.write();
        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, b| now.saturating_duration_since(b.last_update) < IDLE_BUCKET_TTL);
        }

        let bucket = buckets.entry(client).or_insert(Bucket {
            tokens: capacity,
            last_update: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(capacity);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.check(peer.ip()) {
        debug!(client = %peer.ip(), path = %request.uri().path(), "rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Rate limited" })),
        )
            .into_response();
    }
    next.run(request).await
}
