//! Request counters persisted to a JSON file.
//!
//! The file is the restart-recovery source: loaded once at startup and
//! rewritten wholesale after every update. Rewriting on each request is a
//! write-amplification point; fine for a single endpoint, not for heavy load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::client_ip::ClientAddress;
use crate::error::PersistError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub requests_per_ip: BTreeMap<String, u64>,
    pub methods: BTreeMap<String, u64>,
    pub paths: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    fn count(&mut self, ip: &str, method: &str, path: &str) {
        self.total_requests += 1;
        *self.requests_per_ip.entry(ip.to_string()).or_default() += 1;
        *self.methods.entry(method.to_string()).or_default() += 1;
        *self.paths.entry(path.to_string()).or_default() += 1;
    }
}

pub struct Aggregator {
    snapshot: Mutex<MetricsSnapshot>,
    path: PathBuf,
}

impl Aggregator {
    /// Load the snapshot at `path`, starting from zero when it is missing or
    /// unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match read_snapshot(&path) {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    path = %path.display(),
                    total_requests = snapshot.total_requests,
                    "Restored metrics snapshot"
                );
                snapshot
            }
            Ok(None) => MetricsSnapshot::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable metrics file");
                MetricsSnapshot::default()
            }
        };

        Self {
            snapshot: Mutex::new(snapshot),
            path,
        }
    }

    /// Count one request and persist the full snapshot before returning.
    ///
    /// The lock covers both the update and the file write, so concurrent
    /// writers never overwrite each other's counts.
    pub fn record(&self, ip: &ClientAddress, method: &str, path: &str) -> Result<(), PersistError> {
        let mut snapshot = self.lock();
        snapshot.count(ip.as_str(), method, path);
        write_snapshot(&self.path, &snapshot)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    // A panic mid-update can't leave the counters half-written
    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_snapshot(path: &Path) -> Result<Option<MetricsSnapshot>, PersistError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

// Write to a sibling temp file, then rename over the target
fn write_snapshot(path: &Path, snapshot: &MetricsSnapshot) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
