//! Instrumented HTTP endpoint.
//!
//! ```text
//! request → client_ip::resolve → RateLimiter::admit ──429──▶ response
//!                                      │
//!                                      ▼
//!                                   handler
//!                                      │
//!          RequestMetrics ◀── Aggregator ◀── RequestLog ──▶ response
//!
//! scrape  → Exporter::render (Aggregator snapshot + RequestMetrics)
//! ```

pub mod aggregator;
pub mod app;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod exporter;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod request_log;
pub mod state;
pub mod store;
