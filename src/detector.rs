use crate::{PhilosopherState, SeatSnapshot};

/// Predicate deciding whether a snapshot of the table is deadlocked.
///
/// Implementations must be pure: the observer calls them with a fresh,
/// possibly cross-seat inconsistent, snapshot on every poll.
pub trait DeadlockDetector: Send + Sync + 'static {
    fn is_deadlocked(&self, seats: &[SeatSnapshot]) -> bool;
}

/// Circular-wait detector for a ring of philosophers.
///
/// Reports a deadlock when every philosopher is hungry and holds exactly one
/// fork. Any seat holding zero or two forks, or not hungry, disproves it.
///
/// The pattern is a reliable sign of deadlock only under per-fork
/// arbitration; the arbiter never hands out a single fork. Because the
/// observer samples rather than watches, a snapshot that is about to resolve
/// may still be reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingDetector;

impl DeadlockDetector for RingDetector {
    fn is_deadlocked(&self, seats: &[SeatSnapshot]) -> bool {
        !seats.is_empty()
            && seats
                .iter()
                .all(|s| s.state == PhilosopherState::Hungry && s.forks_held() == 1)
    }
}
