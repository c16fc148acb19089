//! Prometheus text exposition for `/metrics`.
//!
//! Snapshot gauges are rebuilt in a throwaway registry on every scrape so the
//! output always mirrors the aggregator exactly. Request instrumentation and
//! limiter health come from their own registries and are appended as-is.

use prometheus::{Encoder, GaugeVec, IntGauge, Opts, Registry, TextEncoder, proto::MetricFamily};
use std::sync::Arc;

use crate::aggregator::{Aggregator, MetricsSnapshot};
use crate::error::ExportError;
use crate::metrics::RequestMetrics;

pub struct Exporter {
    aggregator: Arc<Aggregator>,
    requests: Arc<RequestMetrics>,
}

impl Exporter {
    pub fn new(aggregator: Arc<Aggregator>, requests: Arc<RequestMetrics>) -> Self {
        Self {
            aggregator,
            requests,
        }
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    // Read-only: never touches aggregator state
    pub fn render(&self) -> Result<String, ExportError> {
        let mut families = snapshot_families(&self.aggregator.snapshot())?;
        families.extend(self.requests.gather());
        families.extend(prometheus::gather());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn snapshot_families(snapshot: &MetricsSnapshot) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let registry = Registry::new();

    let total = IntGauge::new("monitor_total_requests", "Total HTTP requests (persisted)")?;
    total.set(snapshot.total_requests as i64);
    registry.register(Box::new(total))?;

    let breakdowns = [
        ("monitor_requests_by_ip", "Requests per IP", "ip", &snapshot.requests_per_ip),
        ("monitor_requests_by_method", "Requests per method", "method", &snapshot.methods),
        ("monitor_requests_by_path", "Requests per path", "path", &snapshot.paths),
    ];
    for (name, help, label, counts) in breakdowns {
        let gauge = GaugeVec::new(Opts::new(name, help), &[label])?;
        for (key, count) in counts {
            gauge.with_label_values(&[key.as_str()]).set(*count as f64);
        }
        registry.register(Box::new(gauge))?;
    }

    Ok(registry.gather())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn renders_snapshot_counters() {
        let snapshot = MetricsSnapshot {
            total_requests: 5,
            requests_per_ip: BTreeMap::from([("10.0.0.1".to_string(), 5)]),
            methods: BTreeMap::from([("GET".to_string(), 5)]),
            paths: BTreeMap::from([("/".to_string(), 5)]),
        };

        let families = snapshot_families(&snapshot).unwrap();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("\nmonitor_total_requests 5\n"), "{text}");
        assert!(text.contains("monitor_requests_by_ip{ip=\"10.0.0.1\"} 5\n"), "{text}");
        assert!(text.contains("monitor_requests_by_method{method=\"GET\"} 5\n"), "{text}");
        assert!(text.contains("monitor_requests_by_path{path=\"/\"} 5\n"), "{text}");
    }

    #[test]
    fn empty_snapshot_still_reports_total() {
        let families = snapshot_families(&MetricsSnapshot::default()).unwrap();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("monitor_total_requests 0"));
        assert!(!text.contains("monitor_requests_by_ip{"));
    }

    #[test]
    fn render_includes_request_instrumentation_and_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = Arc::new(Aggregator::load(dir.path().join("metrics.json")));
        let requests = Arc::new(RequestMetrics::new().unwrap());
        requests.observe("GET", "/", 200, std::time::Duration::from_millis(1));

        let exporter = Exporter::new(aggregator.clone(), requests);
        let text = exporter.render().unwrap();

        assert!(text.contains("http_requests_total{endpoint=\"/\",http_status=\"200\",method=\"GET\"} 1"), "{text}");
        assert!(text.contains("inprogress_requests 0"));
        assert_eq!(aggregator.snapshot(), MetricsSnapshot::default());
        assert_eq!(exporter.content_type(), "text/plain; version=0.0.4");
    }
}
