use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared provider request budget: a cap on outstanding requests plus a
/// token bucket on the request rate. Workers wait cooperatively.
#[derive(Clone)]
pub struct RequestBudget {
    in_flight: Arc<Semaphore>,
    rate: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    max_concurrent: usize,
    per_second: NonZeroU32,
}

impl fmt::Debug for RequestBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBudget")
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.in_flight.available_permits())
            .field("per_second", &self.per_second)
            .finish()
    }
}

/// Held for the duration of one provider request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

impl RequestBudget {
    pub fn new(max_concurrent: usize, requests_per_second: u32) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let per_second =
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            in_flight: Arc::new(Semaphore::new(max_concurrent)),
            rate: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            max_concurrent,
            per_second,
        }
    }

    /// Wait for a concurrency slot, then for a rate token.
    ///
    /// Returns `None` only if the budget was closed.
    pub async fn acquire(&self) -> Option<RequestPermit> {
        let permit = self.in_flight.clone().acquire_owned().await.ok()?;
        self.rate.until_ready().await;
        Some(RequestPermit { _permit: permit })
    }

    /// Stop handing out permits; waiters wake with `None`.
    pub fn close(&self) {
        self.in_flight.close();
    }

    pub fn available(&self) -> usize {
        self.in_flight.available_permits()
    }
}
