use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

use crate::{ForkId, ForkStatus, ForkUtilization, SeatId, TimeInState, ledger::ForkLedger};

/// A mutually-exclusive fork with its own lock.
///
/// All mutations run under the fork's lock, and the lock is held only for
/// the state and accounting update: nothing sleeps or waits on another fork
/// while holding it. The lock is FIFO, so competing requesters are served in
/// arrival order.
///
/// Failed operations are plain `false` returns:
/// - `try_acquire` returning `false` means someone else holds the fork (or
///   the lock could not be obtained in time) and is cheap to retry
/// - `release`/`mark_eating` returning `false` means the caller does not own
///   the fork, which points at a defect in the caller but leaves the fork
///   untouched
#[derive(Debug)]
pub struct Fork {
    id: ForkId,
    ledger: Mutex<ForkLedger>,
}

impl Fork {
    pub fn new(id: ForkId) -> Self {
        Self::with_origin(id, Instant::now())
    }

    pub(crate) fn with_origin(id: ForkId, origin: Instant) -> Self {
        Self {
            id,
            ledger: Mutex::new(ForkLedger::new(id, origin)),
        }
    }

    #[inline]
    pub fn id(&self) -> ForkId {
        self.id
    }

    /// Take the fork for `requester` if it is available once the lock is
    /// obtained within `timeout`.
    pub async fn try_acquire(&self, requester: SeatId, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.ledger.lock()).await {
            Ok(mut ledger) => ledger.acquire(requester, Instant::now()),
            Err(_) => false,
        }
    }

    /// Switch the fork into its eating sub-state. No-op unless `requester`
    /// holds it and is not eating yet.
    pub async fn mark_eating(&self, requester: SeatId) -> bool {
        let mut ledger = self.ledger.lock().await;
        ledger.mark_eating(requester, Instant::now())
    }

    /// Give the fork back. Returns `false` if `requester` is not the owner.
    pub async fn release(&self, requester: SeatId) -> bool {
        let mut ledger = self.ledger.lock().await;
        ledger.release(requester, Instant::now())
    }

    /// Current state and owner, read under the fork's lock.
    pub async fn snapshot(&self) -> ForkStatus {
        self.ledger.lock().await.status()
    }

    pub async fn times(&self) -> TimeInState {
        self.ledger.lock().await.times(Instant::now())
    }

    pub async fn utilization(&self) -> ForkUtilization {
        self.ledger.lock().await.utilization(Instant::now())
    }
}
