use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::exporter::Exporter;
use crate::metrics::RequestMetrics;
use crate::rate_limit::RateLimiter;
use crate::request_log::RequestLog;

// app's shared state, built once at startup and injected into the router
pub struct AppState {
    pub limiter: RateLimiter,
    pub aggregator: Arc<Aggregator>,
    pub request_log: RequestLog,
    pub request_metrics: Arc<RequestMetrics>,
    pub exporter: Exporter,
}

impl AppState {
    pub fn new(
        limiter: RateLimiter,
        aggregator: Aggregator,
        request_log: RequestLog,
        request_metrics: RequestMetrics,
    ) -> Self {
        let aggregator = Arc::new(aggregator);
        let request_metrics = Arc::new(request_metrics);
        let exporter = Exporter::new(aggregator.clone(), request_metrics.clone());

        Self {
            limiter,
            aggregator,
            request_log,
            request_metrics,
            exporter,
        }
    }
}
