use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    proto::MetricFamily, register_int_counter, register_int_counter_vec, register_int_gauge,
};
use std::time::Duration;

// Limiter health, process wide (default registry)
lazy_static! {
    pub static ref RATE_LIMIT_STORE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "rate_limit_store_errors_total",
        "Counter store failures seen by the rate limiter",
        &["op"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTED: IntCounter =
        register_int_counter!("rate_limit_rejected_total", "Requests rejected with 429").unwrap();
    pub static ref RATE_LIMITER_ENABLED: IntGauge = register_int_gauge!(
        "rate_limiter_enabled",
        "1 when the counter store was reachable at startup"
    )
    .unwrap();
}

/// Per-request instrumentation updated by the dispatcher hooks.
///
/// Owns its registry so several dispatchers (and tests) don't share counters.
pub struct RequestMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
    in_flight: IntGauge,
}

impl RequestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Count of HTTP requests"),
            &["method", "endpoint", "http_status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Request latency in seconds"),
            &["method", "endpoint"],
        )?;
        let in_flight = IntGauge::new("inprogress_requests", "Number of requests in progress")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
            in_flight,
        })
    }

    // Marks a request in flight until the guard is dropped
    pub fn start(&self) -> InFlightGuard {
        self.in_flight.inc();
        InFlightGuard {
            gauge: self.in_flight.clone(),
        }
    }

    pub fn observe(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[method, endpoint, status.as_str()])
            .inc();
        self.latency
            .with_label_values(&[method, endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.get()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

// Decrements on every exit path, including cancellation and unwinding
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
