use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;

use crate::{Error, Fork, ForkId, ForkStatus, ForkUtilization, Result, SeatId, ledger::ForkLedger};

/// Central arbiter owning every fork of the table.
///
/// A single lock guards the whole flat array of forks, which is what makes
/// [`try_acquire_forks`](Self::try_acquire_forks) all-or-nothing: both forks
/// are checked and claimed inside one critical section, so no philosopher
/// ever ends up holding exactly one of the pair it asked for and a circular
/// wait cannot form.
///
/// Every operation is synchronous and short; none of them waits.
#[derive(Debug)]
pub struct TableManager {
    forks: Mutex<Vec<ForkLedger>>,
}

impl TableManager {
    /// Create a table with `forks` available forks.
    ///
    /// Returns [`Error::TooFewSeats`] for fewer than two forks.
    pub fn new(forks: usize) -> Result<Self> {
        Self::with_origin(forks, Instant::now())
    }

    pub(crate) fn with_origin(forks: usize, origin: Instant) -> Result<Self> {
        if forks < 2 {
            return Err(Error::TooFewSeats(forks));
        }
        let ledgers = (0..forks).map(|id| ForkLedger::new(id, origin)).collect();
        Ok(Self {
            forks: Mutex::new(ledgers),
        })
    }

    #[inline]
    fn forks(&self) -> MutexGuard<'_, Vec<ForkLedger>> {
        self.forks.lock().expect("TableManager lock poisoned")
    }

    pub fn len(&self) -> usize {
        self.forks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forks().is_empty()
    }

    /// Grant both forks to `seat`, or neither.
    ///
    /// Returns `false` if either fork is not available, if the indices are
    /// out of range, or if they name the same fork.
    pub fn try_acquire_forks(&self, seat: SeatId, left: ForkId, right: ForkId) -> bool {
        let mut forks = self.forks();
        if left == right || left >= forks.len() || right >= forks.len() {
            return false;
        }
        if !forks[left].is_available() || !forks[right].is_available() {
            return false;
        }
        let now = Instant::now();
        forks[left].acquire(seat, now);
        forks[right].acquire(seat, now);
        true
    }

    /// Release whichever of the two forks `seat` owns.
    ///
    /// Returns `true` if at least one fork was released.
    pub fn release_forks(&self, seat: SeatId, left: ForkId, right: ForkId) -> bool {
        let mut forks = self.forks();
        let now = Instant::now();
        let mut released = false;
        for idx in [left, right] {
            if let Some(fork) = forks.get_mut(idx) {
                released |= fork.release(seat, now);
            }
        }
        released
    }

    /// Release a single fork owned by `seat`.
    pub fn release_fork(&self, seat: SeatId, fork: ForkId) -> bool {
        let now = Instant::now();
        self.forks()
            .get_mut(fork)
            .is_some_and(|f| f.release(seat, now))
    }

    /// Switch both forks into their eating sub-state, where `seat` owns them.
    ///
    /// Returns `true` only if both forks were switched.
    pub fn mark_eating(&self, seat: SeatId, left: ForkId, right: ForkId) -> bool {
        let mut forks = self.forks();
        let now = Instant::now();
        let mut marked = 0;
        for idx in [left, right] {
            if let Some(fork) = forks.get_mut(idx) {
                if fork.mark_eating(seat, now) {
                    marked += 1;
                }
            }
        }
        marked == 2
    }

    /// Point-in-time state and owner of every fork.
    pub fn status(&self) -> Vec<ForkStatus> {
        self.forks().iter().map(ForkLedger::status).collect()
    }

    /// Flush every fork up to now and report its time-in-state shares.
    pub fn utilization(&self) -> Vec<ForkUtilization> {
        let now = Instant::now();
        self.forks()
            .iter_mut()
            .map(|fork| fork.utilization(now))
            .collect()
    }
}

/// The forks of a running table, as seen by reporting and cleanup code.
#[derive(Debug, Clone)]
pub(crate) enum ForkBoard {
    PerFork(Arc<[Arc<Fork>]>),
    Arbiter(Arc<TableManager>),
}

impl ForkBoard {
    /// Fork states, each read under its own lock. Not atomic across forks.
    pub async fn status(&self) -> Vec<ForkStatus> {
        match self {
            ForkBoard::PerFork(forks) => {
                let mut out = Vec::with_capacity(forks.len());
                for fork in forks.iter() {
                    out.push(fork.snapshot().await);
                }
                out
            }
            ForkBoard::Arbiter(table) => table.status(),
        }
    }

    pub async fn utilization(&self) -> Vec<ForkUtilization> {
        match self {
            ForkBoard::PerFork(forks) => {
                let mut out = Vec::with_capacity(forks.len());
                for fork in forks.iter() {
                    out.push(fork.utilization().await);
                }
                out
            }
            ForkBoard::Arbiter(table) => table.utilization(),
        }
    }
}
