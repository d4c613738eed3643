//! Per-route, per-client request quotas enforced as middleware ahead of the
//! handlers. Fixed windows in process memory; stale entries are swept on
//! each check.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct RateLimiter {
    hits: Mutex<HashMap<(String, String), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit for (route, client) and report whether it fits within
    /// `max` hits per `window`.
    pub async fn allow(&self, route: &str, client: &str, max: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let entry = hits
            .entry((route.to_string(), client.to_string()))
            .or_default();
        entry.retain(|t| now.duration_since(*t) < window);
        if entry.len() as u64 >= max as u64 {
            return false;
        }
        entry.push(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Quota attached to a route via `middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct RouteQuota {
    pub limiter: Arc<RateLimiter>,
    pub route: &'static str,
    pub max: u32,
    pub window: Duration,
}

impl RouteQuota {
    pub fn per_hour(limiter: Arc<RateLimiter>, route: &'static str, max: u32) -> Self {
        Self {
            limiter,
            route,
            max,
            window: Duration::from_secs(3600),
        }
    }
}

pub async fn enforce(State(quota): State<RouteQuota>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if quota
        .limiter
        .allow(quota.route, &client, quota.max, quota.window)
        .await
    {
        next.run(request).await
    } else {
        tracing::warn!("Rate limit hit on {} by {}", quota.route, client);
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_quota_then_blocks() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(3600);

        for _ in 0..5 {
            assert!(limiter.allow("register", "1.2.3.4", 5, window).await);
        }
        assert!(!limiter.allow("register", "1.2.3.4", 5, window).await);
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(3600);

        assert!(limiter.allow("login", "1.2.3.4", 1, window).await);
        assert!(!limiter.allow("login", "1.2.3.4", 1, window).await);
        assert!(limiter.allow("login", "5.6.7.8", 1, window).await);
    }

    #[tokio::test]
    async fn routes_are_counted_separately() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(3600);

        assert!(limiter.allow("register", "1.2.3.4", 1, window).await);
        assert!(limiter.allow("login", "1.2.3.4", 1, window).await);
    }

    #[tokio::test]
    async fn hits_expire_with_the_window() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(20);

        assert!(limiter.allow("login", "1.2.3.4", 1, window).await);
        assert!(!limiter.allow("login", "1.2.3.4", 1, window).await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.allow("login", "1.2.3.4", 1, window).await);
    }
}
