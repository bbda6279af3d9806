use std::{fmt, time::Duration};

use tokio::time::Instant;

use crate::{ForkId, ForkStatus, ForkUtilization, SeatId};

/// Lifecycle state of a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForkState {
    /// Nobody holds or claims the fork.
    #[default]
    Available,
    /// Claimed by a pending request but not yet held.
    Queued,
    /// Held by its owner, either while still acquiring or while eating.
    InUse,
}

impl fmt::Display for ForkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkState::Available => write!(f, "Available"),
            ForkState::Queued => write!(f, "Queued"),
            ForkState::InUse => write!(f, "InUse"),
        }
    }
}

/// Time a fork has spent in each state bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimeInState {
    pub available: Duration,
    pub queued: Duration,
    /// In use by an owner that is not eating yet.
    pub in_use: Duration,
    /// In use by an owner that is eating.
    pub eating: Duration,
}

impl TimeInState {
    pub fn total(&self) -> Duration {
        self.available + self.queued + self.in_use + self.eating
    }
}

/// State and time-in-state accounting of a single fork.
///
/// Every transition first flushes the time elapsed since the previous
/// transition into the bucket of the state being left, then records the
/// new state. The ledger carries no lock of its own: callers keep it behind
/// the same lock that serializes the transitions, so no interval is lost or
/// counted twice.
#[derive(Debug)]
pub(crate) struct ForkLedger {
    id: ForkId,
    state: ForkState,
    owner: Option<SeatId>,
    eating: bool,
    origin: Instant,
    last_change: Instant,
    times: TimeInState,
}

impl ForkLedger {
    pub fn new(id: ForkId, now: Instant) -> Self {
        Self {
            id,
            state: ForkState::Available,
            owner: None,
            eating: false,
            origin: now,
            last_change: now,
            times: TimeInState::default(),
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.state == ForkState::Available
    }

    fn flush(&mut self, now: Instant) {
        let delta = now.saturating_duration_since(self.last_change);
        match self.state {
            ForkState::Available => self.times.available += delta,
            ForkState::Queued => self.times.queued += delta,
            ForkState::InUse if self.eating => self.times.eating += delta,
            ForkState::InUse => self.times.in_use += delta,
        }
        if now > self.last_change {
            self.last_change = now;
        }
    }

    /// Available → InUse(owner). Returns `false` without touching anything
    /// when the fork is not available.
    pub fn acquire(&mut self, owner: SeatId, now: Instant) -> bool {
        if !self.is_available() {
            return false;
        }
        self.flush(now);
        self.state = ForkState::InUse;
        self.owner = Some(owner);
        self.eating = false;
        true
    }

    /// InUse(owner, not eating) → InUse(owner, eating).
    pub fn mark_eating(&mut self, owner: SeatId, now: Instant) -> bool {
        if self.owner != Some(owner) || self.state != ForkState::InUse || self.eating {
            return false;
        }
        self.flush(now);
        self.eating = true;
        true
    }

    /// InUse(owner) → Available.
    pub fn release(&mut self, owner: SeatId, now: Instant) -> bool {
        if self.owner != Some(owner) || self.state != ForkState::InUse {
            return false;
        }
        self.flush(now);
        self.state = ForkState::Available;
        self.owner = None;
        self.eating = false;
        true
    }

    pub fn status(&self) -> ForkStatus {
        ForkStatus {
            id: self.id,
            state: self.state,
            owner: self.owner,
            eating: self.eating,
        }
    }

    /// Flush up to `now` and return the accumulated buckets.
    pub fn times(&mut self, now: Instant) -> TimeInState {
        self.flush(now);
        self.times
    }

    /// Flush up to `now` and express every bucket as a share of the time
    /// since the ledger was created.
    pub fn utilization(&mut self, now: Instant) -> ForkUtilization {
        let times = self.times(now);
        let elapsed = self.last_change.saturating_duration_since(self.origin);
        ForkUtilization::from_times(self.id, &times, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn acquire_requires_available() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(0, t0);
        assert!(ledger.acquire(1, t0));
        assert!(!ledger.acquire(2, t0));
        assert_eq!(ledger.status().owner, Some(1));
        assert_eq!(ledger.status().state, ForkState::InUse);
    }

    #[test]
    fn only_owner_can_release_or_mark() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(0, t0);
        assert!(ledger.acquire(1, t0));
        assert!(!ledger.mark_eating(2, t0));
        assert!(!ledger.release(2, t0));
        assert_eq!(ledger.status().owner, Some(1));
        assert!(ledger.mark_eating(1, t0));
        assert!(!ledger.mark_eating(1, t0), "already eating");
        assert!(ledger.release(1, t0));
        assert_eq!(ledger.status().owner, None);
        assert!(!ledger.status().eating);
        assert!(!ledger.release(1, t0), "already released");
    }

    #[test]
    fn time_goes_to_the_state_being_left() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(0, t0);
        ledger.acquire(3, t0 + ms(10));
        ledger.mark_eating(3, t0 + ms(25));
        ledger.release(3, t0 + ms(65));
        let times = ledger.times(t0 + ms(100));

        assert_eq!(times.available, ms(10) + ms(35));
        assert_eq!(times.in_use, ms(15));
        assert_eq!(times.eating, ms(40));
        assert_eq!(times.queued, Duration::ZERO);
        assert_eq!(times.total(), ms(100));
    }

    #[test]
    fn failed_transitions_do_not_flush() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(0, t0);
        ledger.acquire(1, t0 + ms(10));
        assert!(!ledger.acquire(2, t0 + ms(20)));
        assert!(!ledger.release(2, t0 + ms(30)));
        let times = ledger.times(t0 + ms(40));
        assert_eq!(times.available, ms(10));
        assert_eq!(times.in_use, ms(30));
    }

    #[test]
    fn utilization_partitions_elapsed_time() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(4, t0);
        ledger.acquire(0, t0 + ms(20));
        ledger.mark_eating(0, t0 + ms(40));
        let u = ledger.utilization(t0 + ms(80));
        assert_eq!(u.fork, 4);
        assert!((u.available - 25.0).abs() < 1e-9);
        assert!((u.in_use - 25.0).abs() < 1e-9);
        assert!((u.eating - 50.0).abs() < 1e-9);
        assert!((u.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let t0 = Instant::now();
        let mut ledger = ForkLedger::new(0, t0 + ms(50));
        ledger.acquire(0, t0);
        let times = ledger.times(t0 + ms(60));
        assert_eq!(times.available, Duration::ZERO);
        assert_eq!(times.in_use, ms(10));
    }
}
