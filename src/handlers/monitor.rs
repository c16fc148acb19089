use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

// Structured view of the persisted counters
pub async fn monitor_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "logged",
        "custom_metrics": state.aggregator.snapshot(),
    }))
}
