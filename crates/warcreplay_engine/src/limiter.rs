//! Per-archive admission control.
//!
//! A counting semaphore with one permit per in-flight request. Taking a
//! permit is the increment; dropping it is the decrement and doubles as the
//! completion notification, so the count is restored even when a request
//! fails or its task panics.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The limiter was closed while a caller was waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Concurrency limiter closed (cap {cap})")]
pub struct LimiterClosed {
    /// Cap of the closed limiter
    pub cap: usize,
}

/// Bounds the number of in-flight requests of one archive
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    cap: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `cap` requests in flight (at least one)
    #[must_use]
    pub fn new(cap: usize) -> Self {
        let cap = cap.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(cap)),
            cap,
        }
    }

    /// Take a slot, waiting for an in-flight request to finish if all slots
    /// are taken.
    ///
    /// # Errors
    ///
    /// Returns error if the limiter was closed
    pub async fn acquire(&self) -> Result<InFlightPermit, LimiterClosed> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(|permit| InFlightPermit { _permit: permit })
            .map_err(|_| LimiterClosed { cap: self.cap })
    }

    /// Wait until every slot has been returned
    ///
    /// # Errors
    ///
    /// Returns error if the limiter was closed
    pub async fn drain(&self) -> Result<(), LimiterClosed> {
        let all = u32::try_from(self.cap).unwrap_or(u32::MAX);
        let _all = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|_| LimiterClosed { cap: self.cap })?;
        Ok(())
    }

    /// Requests currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.cap - self.semaphore.available_permits()
    }

    /// Maximum requests in flight
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }
}

/// One in-flight slot; released on drop
#[derive(Debug)]
pub struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}
