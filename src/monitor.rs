use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{DeadlockReport, ForkId, PhilosopherState, SeatId};

/// Instrumentation hooks invoked as a simulation runs.
///
/// Every method has a no-op default, so implementors only override what
/// they observe. Hooks run synchronously on the task that emits them, so
/// they should be quick; a hook that panics is removed from the simulation.
///
/// Fork hooks are emitted after the fact: `on_fork_acquired` once the fork
/// has been taken, `on_fork_released` once it has been handed back.
pub trait Monitor: Send + Sync {
    fn on_state_change(&self, seat: SeatId, from: PhilosopherState, to: PhilosopherState) {
        let _s = seat;
        let _f = from;
        let _t = to;
    }

    fn on_fork_acquired(&self, seat: SeatId, fork: ForkId) {
        let _s = seat;
        let _f = fork;
    }

    fn on_fork_released(&self, seat: SeatId, fork: ForkId) {
        let _s = seat;
        let _f = fork;
    }

    fn on_failed_attempt(&self, seat: SeatId) {
        let _s = seat;
    }

    fn on_deadlock(&self, report: &DeadlockReport) {
        let _r = report;
    }
}

/// Counts completed meals by watching Eating → Thinking transitions.
#[derive(Debug, Default)]
pub struct MealCounter {
    meals: AtomicU64,
}

impl MealCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meals(&self) -> u64 {
        self.meals.load(Ordering::Acquire)
    }
}

impl Monitor for MealCounter {
    fn on_state_change(&self, _seat: SeatId, from: PhilosopherState, to: PhilosopherState) {
        if from == PhilosopherState::Eating && to == PhilosopherState::Thinking {
            self.meals.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// The monitors attached to one simulation.
///
/// Notifications take a shared read lock, so philosophers never wait on one
/// another to report; the write lock is only taken to drop a monitor that
/// panicked.
#[derive(Default)]
pub(crate) struct Monitors {
    monitors: RwLock<Vec<Arc<dyn Monitor>>>,
}

impl Monitors {
    pub fn new(monitors: Vec<Arc<dyn Monitor>>) -> Self {
        Self {
            monitors: RwLock::new(monitors),
        }
    }

    pub fn state_changed(&self, seat: SeatId, from: PhilosopherState, to: PhilosopherState) {
        self.notify(|m| m.on_state_change(seat, from, to));
    }

    pub fn fork_acquired(&self, seat: SeatId, fork: ForkId) {
        self.notify(|m| m.on_fork_acquired(seat, fork));
    }

    pub fn fork_released(&self, seat: SeatId, fork: ForkId) {
        self.notify(|m| m.on_fork_released(seat, fork));
    }

    pub fn failed_attempt(&self, seat: SeatId) {
        self.notify(|m| m.on_failed_attempt(seat));
    }

    pub fn deadlock(&self, report: &DeadlockReport) {
        self.notify(|m| m.on_deadlock(report));
    }

    fn notify(&self, f: impl Fn(&dyn Monitor)) {
        let mut panicked = Vec::new();
        {
            let monitors = self.monitors.read().expect("Monitors lock poisoned");
            if monitors.is_empty() {
                return;
            }
            for (idx, monitor) in monitors.iter().enumerate() {
                let result = catch_unwind(AssertUnwindSafe(|| f(monitor.as_ref())));
                if result.is_err() {
                    tracing::error!(monitor = idx, "Monitor panicked, removing");
                    panicked.push(Arc::clone(monitor));
                }
            }
        }
        if !panicked.is_empty() {
            let mut monitors = self.monitors.write().expect("Monitors lock poisoned");
            monitors.retain(|m| !panicked.iter().any(|p| Arc::ptr_eq(m, p)));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.monitors.read().expect("Monitors lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PhilosopherState::*;

    struct Exploding;
    impl Monitor for Exploding {
        fn on_failed_attempt(&self, _seat: SeatId) {
            panic!("boom");
        }
    }

    #[test]
    fn meal_counter_counts_finished_meals_only() {
        let counter = MealCounter::new();
        counter.on_state_change(0, Thinking, Hungry);
        counter.on_state_change(0, Hungry, Eating);
        assert_eq!(counter.meals(), 0);
        counter.on_state_change(0, Eating, Thinking);
        counter.on_state_change(1, Eating, Thinking);
        assert_eq!(counter.meals(), 2);
    }

    #[test]
    fn notifies_every_monitor() {
        let a = Arc::new(MealCounter::new());
        let b = Arc::new(MealCounter::new());
        let monitors = Monitors::new(vec![a.clone(), b.clone()]);
        monitors.state_changed(3, Eating, Thinking);
        assert_eq!(a.meals(), 1);
        assert_eq!(b.meals(), 1);
    }

    #[test]
    fn panicking_monitor_is_removed() {
        let counter = Arc::new(MealCounter::new());
        let monitors = Monitors::new(vec![Arc::new(Exploding), counter.clone()]);
        monitors.failed_attempt(0);
        assert_eq!(monitors.len(), 1);
        monitors.state_changed(0, Eating, Thinking);
        assert_eq!(counter.meals(), 1);
    }
}
