//! Concurrency mediation over the store's lease and retry primitives.
//!
//! `with_lease` serializes critical sections on a named lease, retrying
//! acquisition with a linear delay and guaranteeing release on every exit
//! path. `retry_with_backoff` is the generic exponential-retry helper for
//! optimistic-concurrency loops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::error::Error;
use crate::storage::Storage;

#[derive(Clone, Copy, Debug)]
pub struct LeaseOptions {
    pub ttl: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BackoffOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Result of a lease-protected call. `Unavailable` is a recoverable value,
/// not an error: the lease could not be acquired within the retry budget.
#[derive(Debug)]
pub enum LeaseOutcome<T> {
    Completed(T),
    Unavailable,
}

impl<T> LeaseOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Unavailable => None,
        }
    }
}

/// Releases the lease from `drop` if the critical section unwound before the
/// explicit release ran. The TTL remains the backstop when no runtime is
/// available to spawn on.
struct LeaseGuard {
    store: Arc<dyn Storage>,
    name: String,
    holder: Uuid,
    armed: bool,
}

impl LeaseGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let holder = self.holder;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = store.release_lease(&name, holder).await {
                    tracing::warn!(name = %name, code = err.code, "lease release from guard failed");
                }
            });
        }
    }
}

/// Run `critical` while holding the named lease.
///
/// Acquisition is attempted `max_retries` times with a linearly growing
/// delay between attempts. The lease is released whether the critical
/// section returns `Ok`, returns `Err`, or panics.
pub async fn with_lease<T, F, Fut>(
    store: &Arc<dyn Storage>,
    name: &str,
    holder: Uuid,
    opts: &LeaseOptions,
    critical: F,
) -> Result<LeaseOutcome<T>, Error>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    for attempt in 1..=opts.max_retries {
        if store.try_acquire_lease(name, holder, opts.ttl).await? {
            let mut guard = LeaseGuard {
                store: Arc::clone(store),
                name: name.to_string(),
                holder,
                armed: true,
            };

            let result = critical().await;

            let released = store.release_lease(name, holder).await;
            guard.disarm();

            let value = result?;
            released?;
            return Ok(LeaseOutcome::Completed(value));
        }

        if attempt < opts.max_retries {
            sleep(opts.retry_delay * attempt).await;
        }
    }

    tracing::warn!(name, attempts = opts.max_retries, "lease unavailable");
    Ok(LeaseOutcome::Unavailable)
}

/// Run `operation` until it succeeds, sleeping `base_delay * 2^attempt`
/// between tries. The last failure surfaces after the budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    opts: &BackoffOptions,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut last_error = None;

    for attempt in 0..opts.max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(attempt, code = err.code, "retryable operation failed");
                last_error = Some(err);
                if attempt + 1 < opts.max_retries {
                    sleep(opts.base_delay * 2u32.pow(attempt)).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| crate::error::internal_error("retry budget was zero attempts")))
}
