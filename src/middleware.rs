//! Before/after hooks run around every request.
//!
//! Before: resolve the client, ask the limiter, start the latency clock and
//! the in-flight guard. After: request metrics, aggregator, request log.
//! A request dropped mid-flight only releases its in-flight guard and is
//! never recorded.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client_ip::{self, ClientAddress};
use crate::rate_limit::Decision;
use crate::request_log::LogEntry;
use crate::state::AppState;

pub async fn instrument(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip::resolve(request.headers(), peer);

    if state.limiter.admit(&client).await == Decision::Rejected {
        return too_many_requests();
    }

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let in_flight = state.request_metrics.start();

    // Handlers read the resolved address from extensions
    request.extensions_mut().insert(client.clone());

    let response = next.run(request).await;
    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    state.request_metrics.observe(&method, &path, status, elapsed);
    drop(in_flight);

    // File writes and fsync stay off the async workers
    let recorder = state.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        record(&recorder, client, &method, &path, status, elapsed)
    })
    .await;
    if let Err(e) = persisted {
        tracing::warn!(error = %e, "Request recording task failed");
    }

    response
}

// Persistence is best effort: failures are logged, the response still goes out
fn record(
    state: &AppState,
    client: ClientAddress,
    method: &str,
    path: &str,
    status: u16,
    elapsed: Duration,
) {
    if let Err(e) = state.aggregator.record(&client, method, path) {
        tracing::warn!(error = %e, "Failed to persist metrics snapshot");
    }

    let entry = LogEntry::new(method, path, status, elapsed, client);
    if let Err(e) = state.request_log.append(&entry) {
        tracing::warn!(error = %e, "Failed to append request log entry");
    }

    tracing::debug!(
        method,
        path,
        status,
        latency_ms = elapsed.as_millis() as u64,
        ip = %entry.ip,
        "Request completed"
    );
}

fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": "Too many requests" })),
    )
        .into_response()
}
