use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::client_ip::ClientAddress;
use crate::error::PersistError;

// One completed request, one line in requests.log
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub method: String,
    pub endpoint: String,
    pub status: u16,
    pub latency: f64,
    pub ip: ClientAddress,
}

impl LogEntry {
    pub fn new(method: &str, endpoint: &str, status: u16, latency: Duration, ip: ClientAddress) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            status,
            latency: round_latency(latency),
            ip,
        }
    }
}

// Seconds, five decimal places
fn round_latency(latency: Duration) -> f64 {
    (latency.as_secs_f64() * 100_000.0).round() / 100_000.0
}

/// Append-only JSON-lines sink. Never rotated, truncated or read back.
pub struct RequestLog {
    file: Mutex<File>,
}

impl RequestLog {
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, entry: &LogEntry) -> Result<(), PersistError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        // Whole line in one write under the lock
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use std::sync::Arc;

    fn ip(addr: &str) -> ClientAddress {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", addr.parse().unwrap());
        crate::client_ip::resolve(&headers, None)
    }

    #[test]
    fn latency_rounded_to_five_decimals() {
        assert_eq!(round_latency(Duration::from_nanos(1_234_567)), 0.00123);
        assert_eq!(round_latency(Duration::from_secs(2)), 2.0);
    }

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let log = RequestLog::open(&path).unwrap();

        let entry = LogEntry::new("GET", "/monitor", 200, Duration::from_millis(12), ip("10.0.0.1"));
        log.append(&entry).unwrap();
        log.append(&LogEntry::new("POST", "/", 500, Duration::ZERO, ip("10.0.0.2")))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["method"], "GET");
        assert_eq!(first["endpoint"], "/monitor");
        assert_eq!(first["status"], 200);
        assert_eq!(first["latency"], 0.012);
        assert_eq!(first["ip"], "10.0.0.1");
        assert!(first["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn reopening_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let entry = LogEntry::new("GET", "/", 200, Duration::ZERO, ip("10.0.0.1"));

        RequestLog::open(&path).unwrap().append(&entry).unwrap();
        RequestLog::open(&path).unwrap().append(&entry).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let log = Arc::new(RequestLog::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let log = log.clone();
                std::thread::spawn(move || {
                    let entry = LogEntry::new("GET", "/", 200, Duration::ZERO, ip(&format!("10.0.0.{n}")));
                    for _ in 0..50 {
                        log.append(&entry).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 200);
        for line in contents.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
