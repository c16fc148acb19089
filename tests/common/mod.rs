//! Shared fixtures for dispatcher tests.

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, StatusCode, header::HeaderMap},
};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use traffic_monitor::aggregator::Aggregator;
use traffic_monitor::metrics::RequestMetrics;
use traffic_monitor::rate_limit::RateLimiter;
use traffic_monitor::request_log::RequestLog;
use traffic_monitor::state::AppState;
use traffic_monitor::store::{CounterStore, MemoryStore};

/// State with an in-memory counter store and files under `dir`.
pub async fn state_with_limit(dir: &Path, limit: u64) -> Arc<AppState> {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let limiter =
        RateLimiter::connect(store, limit, Duration::from_secs(60), Duration::from_millis(500)).await;
    state_with_limiter(dir, limiter)
}

pub fn state_with_limiter(dir: &Path, limiter: RateLimiter) -> Arc<AppState> {
    Arc::new(AppState::new(
        limiter,
        Aggregator::load(dir.join("metrics.json")),
        RequestLog::open(&dir.join("requests.log")).unwrap(),
        RequestMetrics::new().unwrap(),
    ))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

/// Send one request as if it came from `ip` through a proxy.
pub async fn send(app: &Router, method: Method, path: &str, ip: &str) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        body,
    }
}

#[allow(dead_code)]
pub async fn get(app: &Router, path: &str, ip: &str) -> Reply {
    send(app, Method::GET, path, ip).await
}
