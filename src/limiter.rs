//! Counting admission gate for outbound requests.
//!
//! `ConcurrencyLimiter` bounds how many guarded operations run at once.
//! Waiters are served in FIFO order (tokio's semaphore keeps a queue of
//! waiters plus a permit count). A permit is returned when its
//! `LimiterPermit` guard is dropped. That covers normal completion, early
//! return on error, and a dropped (cancelled) future.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent translation requests
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A cloneable handle to one shared permit pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Proof of admission. Dropping it releases the permit.
#[derive(Debug)]
#[must_use = "the permit is released as soon as the guard is dropped"]
pub struct LimiterPermit {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `capacity` holders.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ConcurrencyLimiter capacity must be > 0");

        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a permit. Callers are admitted in the order they started waiting.
    pub async fn acquire(&self) -> LimiterPermit {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        LimiterPermit {
            inner: Arc::clone(&self.inner),
            _permit: permit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so `in_flight` never exceeds capacity.
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
