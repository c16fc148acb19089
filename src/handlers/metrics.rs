use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::AppState;

// Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.exporter.render() {
        Ok(body) => ([(header::CONTENT_TYPE, state.exporter.content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
