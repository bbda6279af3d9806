use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::SeatId;

/// Per-philosopher counters, readable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PhilosopherSummary {
    pub seat: SeatId,
    pub name: Arc<str>,
    pub thinking: Duration,
    pub eating: Duration,
    /// Time spent hungry before both forks were in hand, summed over meals.
    pub waiting: Duration,
    pub eaten: u64,
    pub failed_attempts: u64,
}

#[derive(Debug)]
struct Entry {
    name: Arc<str>,
    thinking_ns: AtomicU64,
    eating_ns: AtomicU64,
    waiting_ns: AtomicU64,
    eaten: AtomicU64,
    failed_attempts: AtomicU64,
}

impl Entry {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            thinking_ns: AtomicU64::new(0),
            eating_ns: AtomicU64::new(0),
            waiting_ns: AtomicU64::new(0),
            eaten: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
        }
    }
}

#[inline]
fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Thread-safe per-philosopher metrics store.
///
/// One entry per seat, fixed at construction. Every counter is an atomic,
/// so recording never takes a lock and philosophers never contend with each
/// other here. A summary read while a philosopher is mid-update may mix
/// counters from either side of that update.
#[derive(Debug)]
pub struct MetricsCollector {
    entries: Vec<Entry>,
}

impl MetricsCollector {
    pub fn new(names: &[Arc<str>]) -> Self {
        Self {
            entries: names.iter().cloned().map(Entry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_thinking(&self, seat: SeatId, d: Duration) {
        if let Some(e) = self.entries.get(seat) {
            e.thinking_ns.fetch_add(nanos(d), Ordering::Relaxed);
        }
    }

    /// Record a finished meal that lasted `d`.
    pub fn record_meal(&self, seat: SeatId, d: Duration) {
        if let Some(e) = self.entries.get(seat) {
            e.eating_ns.fetch_add(nanos(d), Ordering::Relaxed);
            e.eaten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_waiting(&self, seat: SeatId, d: Duration) {
        if d.is_zero() {
            return;
        }
        if let Some(e) = self.entries.get(seat) {
            e.waiting_ns.fetch_add(nanos(d), Ordering::Relaxed);
        }
    }

    pub fn record_failed_attempt(&self, seat: SeatId) {
        if let Some(e) = self.entries.get(seat) {
            e.failed_attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn summary(&self, seat: SeatId) -> Option<PhilosopherSummary> {
        self.entries.get(seat).map(|e| PhilosopherSummary {
            seat,
            name: e.name.clone(),
            thinking: Duration::from_nanos(e.thinking_ns.load(Ordering::Relaxed)),
            eating: Duration::from_nanos(e.eating_ns.load(Ordering::Relaxed)),
            waiting: Duration::from_nanos(e.waiting_ns.load(Ordering::Relaxed)),
            eaten: e.eaten.load(Ordering::Relaxed),
            failed_attempts: e.failed_attempts.load(Ordering::Relaxed),
        })
    }

    /// Summaries for every seat, in seat order.
    pub fn summaries(&self) -> Vec<PhilosopherSummary> {
        (0..self.entries.len())
            .filter_map(|seat| self.summary(seat))
            .collect()
    }
}
