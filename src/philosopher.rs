use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{SeedableRng, rngs::StdRng};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    Action, Config, Fork, ForkId, ForkStatus, MetricsCollector, Result, SeatId, Strategy,
    TableManager, monitor::Monitors,
};

/// Logical state of a philosopher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhilosopherState {
    #[default]
    Thinking,
    Hungry,
    Eating,
}

impl fmt::Display for PhilosopherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhilosopherState::Thinking => write!(f, "Thinking"),
            PhilosopherState::Hungry => write!(f, "Hungry"),
            PhilosopherState::Eating => write!(f, "Eating"),
        }
    }
}

/// Input to a [`Strategy`](crate::Strategy) decision.
///
/// An immutable copy taken right before the decision: the philosopher's own
/// state plus the public state of its two forks, each read under that fork's
/// lock. No lock is held while the strategy runs, and the forks may have
/// moved on by the time the decision is acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhilosopherView {
    pub seat: SeatId,
    pub state: PhilosopherState,
    pub holds_left: bool,
    pub holds_right: bool,
    pub left: ForkStatus,
    pub right: ForkStatus,
}

/// Public state of one philosopher as last published by its own task.
///
/// The hold flags follow fork ownership but lag behind it: a flag is raised
/// only after the acquisition latency has been paid, and lowered before the
/// fork is handed back. A raised flag therefore always means the fork is
/// owned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SeatSnapshot {
    pub seat: SeatId,
    pub name: Arc<str>,
    pub state: PhilosopherState,
    pub holds_left: bool,
    pub holds_right: bool,
}

impl SeatSnapshot {
    pub(crate) fn new(seat: SeatId, name: Arc<str>) -> Self {
        Self {
            seat,
            name,
            state: PhilosopherState::Thinking,
            holds_left: false,
            holds_right: false,
        }
    }

    /// Number of forks this philosopher reports holding.
    #[inline]
    pub fn forks_held(&self) -> u8 {
        self.holds_left as u8 + self.holds_right as u8
    }
}

/// Single-writer publication slot for a [`SeatSnapshot`].
///
/// Written only by the owning philosopher task, read by the observer and the
/// reporter. Each seat has its own lock, so readers never serialize
/// unrelated philosophers.
#[derive(Debug)]
pub(crate) struct SeatCell(Mutex<SeatSnapshot>);

impl SeatCell {
    pub fn new(snapshot: SeatSnapshot) -> Self {
        Self(Mutex::new(snapshot))
    }

    pub fn load(&self) -> SeatSnapshot {
        self.0.lock().expect("SeatCell lock poisoned").clone()
    }

    fn store(&self, state: PhilosopherState, holds_left: bool, holds_right: bool) {
        let mut slot = self.0.lock().expect("SeatCell lock poisoned");
        slot.state = state;
        slot.holds_left = holds_left;
        slot.holds_right = holds_right;
    }
}

/// The forks a philosopher reaches for, and through whom.
pub(crate) enum Hands {
    /// Each fork is taken on its own, through its own lock.
    PerFork { left: Arc<Fork>, right: Arc<Fork> },
    /// Both forks are granted together by the arbiter.
    Arbiter {
        table: Arc<TableManager>,
        left: ForkId,
        right: ForkId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One philosopher's execution unit.
///
/// Owns the philosopher's local state exclusively; everything other tasks
/// may look at is published through its [`SeatCell`] and recorded in the
/// [`MetricsCollector`].
pub(crate) struct Philosopher {
    seat: SeatId,
    name: Arc<str>,
    hands: Hands,
    strategy: Arc<dyn Strategy>,
    config: Arc<Config>,
    metrics: Arc<MetricsCollector>,
    monitors: Arc<Monitors>,
    published: Arc<SeatCell>,
    cancel_token: CancellationToken,
    rng: StdRng,

    state: PhilosopherState,
    holds_left: bool,
    holds_right: bool,
    hungry_since: Instant,
}

pub(crate) struct PhilosopherParts {
    pub seat: SeatId,
    pub name: Arc<str>,
    pub hands: Hands,
    pub strategy: Arc<dyn Strategy>,
    pub config: Arc<Config>,
    pub metrics: Arc<MetricsCollector>,
    pub monitors: Arc<Monitors>,
    pub published: Arc<SeatCell>,
    pub cancel_token: CancellationToken,
}

impl Philosopher {
    const SEED_SPREAD: u64 = 0x9e37_79b9_7f4a_7c15;

    pub fn new(parts: PhilosopherParts) -> Self {
        let rng = match parts.config.seed {
            Some(seed) => StdRng::seed_from_u64(
                seed.wrapping_add((parts.seat as u64).wrapping_mul(Self::SEED_SPREAD)),
            ),
            None => StdRng::from_os_rng(),
        };
        Self {
            seat: parts.seat,
            name: parts.name,
            hands: parts.hands,
            strategy: parts.strategy,
            config: parts.config,
            metrics: parts.metrics,
            monitors: parts.monitors,
            published: parts.published,
            cancel_token: parts.cancel_token,
            rng,
            state: PhilosopherState::Thinking,
            holds_left: false,
            holds_right: false,
            hungry_since: Instant::now(),
        }
    }

    /// Drive the state machine until the cancellation token fires, then hand
    /// back every fork still held.
    pub async fn run(mut self) -> Result<()> {
        debug!(name = %self.name, "seated");
        while !self.cancel_token.is_cancelled() {
            self.step().await;
        }
        self.release_all().await;
        debug!(name = %self.name, "left the table");
        Ok(())
    }

    /// One decision cycle: the strategy sees the current view and its
    /// action is carried out against whichever arbitration the seat uses.
    async fn step(&mut self) {
        let view = self.view().await;
        let action = self.strategy.decide(&view);
        match action {
            Action::None => self.advance().await,
            Action::TakeLeftFork => self.take(Side::Left).await,
            Action::TakeRightFork => self.take(Side::Right).await,
            Action::ReleaseLeftFork => self.put_down(Side::Left).await,
            Action::ReleaseRightFork => self.put_down(Side::Right).await,
        }
    }

    async fn view(&self) -> PhilosopherView {
        let (left, right) = match &self.hands {
            Hands::PerFork { left, right } => (left.snapshot().await, right.snapshot().await),
            Hands::Arbiter { table, left, right } => {
                let status = table.status();
                (status[*left], status[*right])
            }
        };
        PhilosopherView {
            seat: self.seat,
            state: self.state,
            holds_left: self.holds_left,
            holds_right: self.holds_right,
            left,
            right,
        }
    }

    /// Progress the current state when there is no fork to pick up or put down.
    async fn advance(&mut self) {
        match self.state {
            PhilosopherState::Thinking => {
                let think = self.config.think.sample(&mut self.rng);
                if !self.nap(think).await {
                    return;
                }
                self.metrics.record_thinking(self.seat, think);
                self.hungry_since = Instant::now();
                self.transition(PhilosopherState::Hungry);
            }
            PhilosopherState::Hungry if self.holds_left && self.holds_right => {
                let waited = self.hungry_since.elapsed();
                self.metrics.record_waiting(self.seat, waited);
                self.mark_eating().await;
                self.transition(PhilosopherState::Eating);
            }
            PhilosopherState::Hungry => {
                self.nap(self.config.retry_delay).await;
            }
            PhilosopherState::Eating => {
                let eat = self.config.eat.sample(&mut self.rng);
                if !self.nap(eat).await {
                    return;
                }
                self.metrics.record_meal(self.seat, eat);
                self.release_all().await;
                self.transition(PhilosopherState::Thinking);
            }
        }
    }

    async fn take(&mut self, side: Side) {
        if self.holds(side) {
            return;
        }
        if let Hands::Arbiter { .. } = self.hands {
            return self.take_both().await;
        }
        let Hands::PerFork { left, right } = &self.hands else {
            return;
        };
        let fork = match side {
            Side::Left => left.clone(),
            Side::Right => right.clone(),
        };

        let acquired = select! {
            _ = self.cancel_token.cancelled() => return,
            ok = fork.try_acquire(self.seat, self.config.acquire_timeout) => ok,
        };

        if !acquired {
            self.record_failed_attempt();
            self.nap(self.config.retry_delay).await;
            return;
        }

        self.monitors.fork_acquired(self.seat, fork.id());
        // A cancelled latency leaves the fork owned but unflagged;
        // release_all returns it on the way out.
        if !self.nap(self.config.acquire_latency).await {
            return;
        }
        debug!(fork = fork.id(), ?side, "picked up fork");
        match side {
            Side::Left => self.holds_left = true,
            Side::Right => self.holds_right = true,
        }
        self.publish();
    }

    /// Arbiter counterpart of [`take`](Self::take): asking for either fork
    /// asks the arbiter for the whole pair, which is granted at once or not
    /// at all. There is no acquisition latency to pay.
    async fn take_both(&mut self) {
        let Hands::Arbiter { table, left, right } = &self.hands else {
            return;
        };
        let (left, right) = (*left, *right);
        if !table.try_acquire_forks(self.seat, left, right) {
            self.record_failed_attempt();
            self.nap(self.config.retry_delay).await;
            return;
        }
        self.monitors.fork_acquired(self.seat, left);
        self.monitors.fork_acquired(self.seat, right);
        debug!(left, right, "took both forks");
        self.holds_left = true;
        self.holds_right = true;
        self.publish();
    }

    async fn put_down(&mut self, side: Side) {
        if !self.holds(side) {
            return;
        }
        match side {
            Side::Left => self.holds_left = false,
            Side::Right => self.holds_right = false,
        }
        self.publish();

        let (id, released) = match &self.hands {
            Hands::PerFork { left, right } => {
                let fork = match side {
                    Side::Left => left,
                    Side::Right => right,
                };
                (fork.id(), fork.release(self.seat).await)
            }
            Hands::Arbiter { table, left, right } => {
                let id = match side {
                    Side::Left => *left,
                    Side::Right => *right,
                };
                (id, table.release_fork(self.seat, id))
            }
        };
        if released {
            self.monitors.fork_released(self.seat, id);
        } else {
            warn!(fork = id, "released a fork it did not own");
        }
    }

    async fn mark_eating(&self) {
        let marked = match &self.hands {
            Hands::PerFork { left, right } => {
                let l = left.mark_eating(self.seat).await;
                let r = right.mark_eating(self.seat).await;
                l && r
            }
            Hands::Arbiter { table, left, right } => table.mark_eating(self.seat, *left, *right),
        };
        if !marked {
            warn!("could not mark both forks as eating");
        }
    }

    /// Hand back every fork this seat may own, flagged or not.
    async fn release_all(&mut self) {
        if self.holds_left || self.holds_right {
            self.holds_left = false;
            self.holds_right = false;
            self.publish();
        }
        match &self.hands {
            Hands::PerFork { left, right } => {
                for fork in [left, right] {
                    if fork.release(self.seat).await {
                        self.monitors.fork_released(self.seat, fork.id());
                    }
                }
            }
            Hands::Arbiter { table, left, right } => {
                let status = table.status();
                let owned: Vec<ForkId> = [*left, *right]
                    .into_iter()
                    .filter(|idx| status[*idx].owner == Some(self.seat))
                    .collect();
                if table.release_forks(self.seat, *left, *right) {
                    owned
                        .into_iter()
                        .for_each(|idx| self.monitors.fork_released(self.seat, idx));
                }
            }
        }
    }

    fn transition(&mut self, to: PhilosopherState) {
        let from = self.state;
        self.state = to;
        self.publish();
        debug!(%from, %to, "state change");
        self.monitors.state_changed(self.seat, from, to);
    }

    fn record_failed_attempt(&self) {
        self.metrics.record_failed_attempt(self.seat);
        self.monitors.failed_attempt(self.seat);
    }

    fn publish(&self) {
        self.published.store(self.state, self.holds_left, self.holds_right);
    }

    #[inline]
    fn holds(&self, side: Side) -> bool {
        match side {
            Side::Left => self.holds_left,
            Side::Right => self.holds_right,
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on
    /// cancellation.
    async fn nap(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return !self.cancel_token.is_cancelled();
        }
        select! {
            _ = self.cancel_token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
