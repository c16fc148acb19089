use axum::{
    Router, middleware,
    routing::{any, get},
};
use std::sync::Arc;

use crate::handlers::{health_handler, home_handler, ip_handler, metrics_handler, monitor_handler};
use crate::middleware::instrument;
use crate::state::AppState;

// creating the router with routes, every one of them instrumented
pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/", get(home_handler))
        .route("/monitor", any(monitor_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ip", get(ip_handler))
        .route("/health", get(health_handler));

    instrumented(routes, state)
}

/// Wrap `routes` in the rate-limit and instrumentation hooks.
pub fn instrumented(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    routes
        .layer(middleware::from_fn_with_state(state.clone(), instrument))
        .with_state(state)
}
