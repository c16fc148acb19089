//! Fixed-window rate limiter over an external counter store.
//!
//! Each client owns one `ratelimit:<ip>` key whose TTL is the window length.
//! The first request of a window creates the key, later ones increment it,
//! and a request is admitted while the post-increment value stays within the
//! ceiling. A client can burst up to twice the ceiling across a window edge.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::client_ip::ClientAddress;
use crate::error::StoreError;
use crate::metrics::{RATE_LIMIT_REJECTED, RATE_LIMIT_STORE_ERRORS, RATE_LIMITER_ENABLED};
use crate::store::CounterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected,
}

pub struct RateLimiter {
    // None once the store was found unreachable at startup
    store: Option<Arc<dyn CounterStore>>,
    limit: u64,
    window: Duration,
    timeout: Duration,
    // Cleared while a mid-run outage is in progress
    store_healthy: AtomicBool,
}

impl RateLimiter {
    /// Build a limiter, probing the store once.
    ///
    /// An unreachable store disables limiting for the life of the process.
    pub async fn connect(
        store: Arc<dyn CounterStore>,
        limit: u64,
        window: Duration,
        timeout: Duration,
    ) -> Self {
        let probe = bounded(timeout, store.ping()).await;
        let store = match probe {
            Ok(()) => {
                tracing::info!(limit, window_secs = window.as_secs(), "Rate limiting enabled");
                Some(store)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Counter store unavailable, rate limiting disabled");
                None
            }
        };
        RATE_LIMITER_ENABLED.set(i64::from(store.is_some()));

        Self {
            store,
            limit,
            window,
            timeout,
            store_healthy: AtomicBool::new(true),
        }
    }

    // Limiter that admits everything
    pub fn disabled() -> Self {
        RATE_LIMITER_ENABLED.set(0);
        Self {
            store: None,
            limit: 0,
            window: Duration::ZERO,
            timeout: Duration::ZERO,
            store_healthy: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn is_store_healthy(&self) -> bool {
        self.store_healthy.load(Ordering::Relaxed)
    }

    pub async fn admit(&self, client: &ClientAddress) -> Decision {
        let Some(store) = &self.store else {
            return Decision::Allowed;
        };

        let count = self.count(store.as_ref(), client).await;
        self.track_store_health(count.as_ref().err());

        match count {
            Ok(count) if exceeds(count, self.limit) => {
                RATE_LIMIT_REJECTED.inc();
                tracing::debug!(client = %client, count, "Rate limit exceeded");
                Decision::Rejected
            }
            Ok(_) => Decision::Allowed,
            // Mid-run store failure: fail open for this request only
            Err(e) => {
                tracing::debug!(client = %client, error = %e, "Rate limit check failed, admitting");
                Decision::Allowed
            }
        }
    }

    // Log outage start and end once each, not per request
    fn track_store_health(&self, error: Option<&StoreError>) {
        match error {
            Some(e) => {
                if self.store_healthy.swap(false, Ordering::Relaxed) {
                    tracing::warn!(error = %e, "Counter store unreachable, admitting requests until it recovers");
                }
            }
            None => {
                if !self.store_healthy.swap(true, Ordering::Relaxed) {
                    tracing::info!("Counter store recovered, rate limiting resumed");
                }
            }
        }
    }

    // Post-increment counter for this client's current window
    async fn count(&self, store: &dyn CounterStore, client: &ClientAddress) -> Result<i64, StoreError> {
        let key = format!("ratelimit:{}", client);

        let current = bounded(self.timeout, store.get(&key))
            .await
            .inspect_err(|_| RATE_LIMIT_STORE_ERRORS.with_label_values(&["get"]).inc())?;

        if current.is_none() {
            bounded(self.timeout, store.set(&key, 1, self.window))
                .await
                .inspect_err(|_| RATE_LIMIT_STORE_ERRORS.with_label_values(&["set"]).inc())?;
            return Ok(1);
        }

        let count = bounded(self.timeout, store.increment(&key))
            .await
            .inspect_err(|_| RATE_LIMIT_STORE_ERRORS.with_label_values(&["increment"]).inc())?;

        // Key expired between get and increment; INCR left it without a TTL
        if count == 1 {
            bounded(self.timeout, store.set(&key, 1, self.window))
                .await
                .inspect_err(|_| RATE_LIMIT_STORE_ERRORS.with_label_values(&["set"]).inc())?;
        }

        Ok(count)
    }
}

fn exceeds(count: i64, limit: u64) -> bool {
    u64::try_from(count).is_ok_and(|count| count > limit)
}

async fn bounded<T>(
    timeout: Duration,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, op)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}
