use std::{
    fmt::{self, Write as _},
    time::Duration,
};

use crate::{
    ArbitrationMode, ForkId, ForkState, PhilosopherSummary, SeatId, SeatSnapshot, TimeInState,
};

/// Point-in-time public state of a fork, read under that fork's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ForkStatus {
    pub id: ForkId,
    pub state: ForkState,
    pub owner: Option<SeatId>,
    /// Owner has both forks and is eating.
    pub eating: bool,
}

/// Share of elapsed time a fork spent in each state, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ForkUtilization {
    pub fork: ForkId,
    pub available: f64,
    pub queued: f64,
    pub in_use: f64,
    pub eating: f64,
}

impl ForkUtilization {
    /// Express `times` as percentages of `elapsed`. Everything is zero when
    /// no time has elapsed yet.
    pub fn from_times(fork: ForkId, times: &TimeInState, elapsed: Duration) -> Self {
        let total = elapsed.as_secs_f64();
        if total <= 0.0 {
            return Self {
                fork,
                ..Self::default()
            };
        }
        let pct = |d: Duration| d.as_secs_f64() * 100.0 / total;
        Self {
            fork,
            available: pct(times.available),
            queued: pct(times.queued),
            in_use: pct(times.in_use),
            eating: pct(times.eating),
        }
    }

    /// Sum of all four shares; 100 up to rounding once time has elapsed.
    pub fn total(&self) -> f64 {
        self.available + self.queued + self.in_use + self.eating
    }
}

impl fmt::Display for ForkUtilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fork-{}: Available={:.2}%, Queued={:.2}%, InUse={:.2}%, Eating={:.2}%",
            self.fork + 1,
            self.available,
            self.queued,
            self.in_use,
            self.eating
        )
    }
}

/// The philosophers' state at the moment a deadlock was confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeadlockReport {
    /// Time since the simulation started.
    pub at: Duration,
    pub seats: Vec<SeatSnapshot>,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held = |h: bool| if h { "HELD" } else { "waiting" };
        writeln!(f)?;
        writeln!(f, "DEADLOCK DETECTED at {:.3}s", self.at.as_secs_f64())?;
        writeln!(f)?;
        writeln!(f, "All philosophers are hungry and each holds exactly one fork.")?;
        writeln!(f, "No philosopher can proceed.")?;
        writeln!(f)?;
        writeln!(f, "Current state:")?;
        for seat in &self.seats {
            writeln!(
                f,
                "  {}: Left fork [{}], Right fork [{}]",
                seat.name,
                held(seat.holds_left),
                held(seat.holds_right)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Simulation will terminate.")
    }
}

/// How a simulation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Outcome {
    /// The time budget elapsed, or the run was stopped from outside.
    Completed,
    Deadlock(DeadlockReport),
}

/// Final report of a simulation run, recomputed from the forks and the
/// metrics after every philosopher has left the table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub outcome: Outcome,
    pub mode: ArbitrationMode,
    pub strategy: String,
    pub philosophers: Vec<PhilosopherSummary>,
    pub forks: Vec<ForkStatus>,
    pub utilization: Vec<ForkUtilization>,
}

impl SimulationReport {
    #[inline]
    pub fn is_deadlock(&self) -> bool {
        matches!(self.outcome, Outcome::Deadlock(_))
    }

    pub fn deadlock(&self) -> Option<&DeadlockReport> {
        match &self.outcome {
            Outcome::Deadlock(report) => Some(report),
            Outcome::Completed => None,
        }
    }

    pub fn total_eaten(&self) -> u64 {
        self.philosophers.iter().map(|p| p.eaten).sum()
    }

    pub fn total_thinking(&self) -> Duration {
        self.philosophers.iter().map(|p| p.thinking).sum()
    }

    pub fn total_eating(&self) -> Duration {
        self.philosophers.iter().map(|p| p.eating).sum()
    }

    /// Meals per millisecond of elapsed time for `seat`.
    pub fn throughput(&self, seat: SeatId) -> f64 {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        match self.philosophers.get(seat) {
            Some(p) if ms > 0.0 => p.eaten as f64 / ms,
            _ => 0.0,
        }
    }

    /// Mean of the per-philosopher throughputs.
    pub fn average_throughput(&self) -> f64 {
        if self.philosophers.is_empty() {
            return 0.0;
        }
        let sum: f64 = (0..self.philosophers.len()).map(|s| self.throughput(s)).sum();
        sum / self.philosophers.len() as f64
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Final Summary ({}, {}) ====", self.mode, self.strategy)?;
        writeln!(f, "Duration: {} ms", self.elapsed.as_millis())?;
        let outcome = if self.is_deadlock() {
            "deadlock"
        } else {
            "completed"
        };
        writeln!(f, "Outcome: {outcome}")?;
        writeln!(f, "Total eaten: {}", self.total_eaten())?;
        writeln!(f, "Per philosopher:")?;
        for p in &self.philosophers {
            writeln!(
                f,
                " {}: eaten={}, thinking={} ms, eatingTime={} ms, failedAttempts={}",
                p.name,
                p.eaten,
                p.thinking.as_millis(),
                p.eating.as_millis(),
                p.failed_attempts
            )?;
        }
        writeln!(f, "Total thinking: {} ms", self.total_thinking().as_millis())?;
        writeln!(f, "Total eating: {} ms", self.total_eating().as_millis())?;
        writeln!(f)?;

        writeln!(f, "==== Metrics ====")?;
        writeln!(f, "Throughput (items per ms):")?;
        for (seat, p) in self.philosophers.iter().enumerate() {
            writeln!(f, " {}: {:.6}", p.name, self.throughput(seat))?;
        }
        writeln!(f, " Average: {:.6}", self.average_throughput())?;
        writeln!(f, "Waiting time (ms):")?;
        for p in &self.philosophers {
            writeln!(f, " {}: {:.2} ms", p.name, p.waiting.as_secs_f64() * 1000.0)?;
        }
        writeln!(f, "Fork utilization (% of time):")?;
        for u in &self.utilization {
            writeln!(f, " {u}")?;
        }
        writeln!(f, "Forks at end:")?;
        write_forks(f, &self.forks, &self.philosophers)?;
        writeln!(f, "Score: {}", self.total_eaten())
    }
}

fn write_forks<W: fmt::Write>(
    out: &mut W,
    forks: &[ForkStatus],
    philosophers: &[PhilosopherSummary],
) -> fmt::Result {
    for fork in forks {
        write!(out, " Fork-{}: {}", fork.id + 1, fork.state)?;
        if let Some(owner) = fork.owner {
            match philosophers.get(owner) {
                Some(p) => write!(out, " (is using by {})", p.name)?,
                None => write!(out, " (is using by seat {owner})")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Render the periodic status block written by the observer.
pub(crate) fn status_block(
    elapsed: Duration,
    philosophers: &[PhilosopherSummary],
    seats: &[SeatSnapshot],
    forks: &[ForkStatus],
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_status_block(&mut out, elapsed, philosophers, seats, forks);
    out
}

fn write_status_block(
    out: &mut String,
    elapsed: Duration,
    philosophers: &[PhilosopherSummary],
    seats: &[SeatSnapshot],
    forks: &[ForkStatus],
) -> fmt::Result {
    writeln!(out, "===== TIME +{:.3}s =====", elapsed.as_secs_f64())?;
    writeln!(out, "Philosophers:")?;
    for p in philosophers {
        write!(
            out,
            " {}: eaten={}, thinking={} ms, eatingTime={} ms, failedAttempts={}",
            p.name,
            p.eaten,
            p.thinking.as_millis(),
            p.eating.as_millis(),
            p.failed_attempts
        )?;
        if let Some(seat) = seats.get(p.seat) {
            write!(out, " [{}, forks={}]", seat.state, seat.forks_held())?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;
    writeln!(out, "Forks:")?;
    write_forks(out, forks, philosophers)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::PhilosopherState;

    fn summary(seat: SeatId, name: &str, eaten: u64) -> PhilosopherSummary {
        PhilosopherSummary {
            seat,
            name: Arc::from(name),
            thinking: Duration::from_millis(100),
            eating: Duration::from_millis(50 * eaten),
            waiting: Duration::from_millis(5),
            eaten,
            failed_attempts: 1,
        }
    }

    fn report(outcome: Outcome) -> SimulationReport {
        SimulationReport {
            elapsed: Duration::from_millis(1000),
            outcome,
            mode: ArbitrationMode::PerFork,
            strategy: "naive".to_string(),
            philosophers: vec![summary(0, "A", 4), summary(1, "B", 2)],
            forks: vec![
                ForkStatus {
                    id: 0,
                    state: ForkState::InUse,
                    owner: Some(1),
                    eating: false,
                },
                ForkStatus {
                    id: 1,
                    state: ForkState::Available,
                    owner: None,
                    eating: false,
                },
            ],
            utilization: vec![ForkUtilization {
                fork: 0,
                available: 50.0,
                queued: 0.0,
                in_use: 20.0,
                eating: 30.0,
            }],
        }
    }

    #[test]
    fn utilization_of_nothing_is_zero() {
        let u = ForkUtilization::from_times(3, &TimeInState::default(), Duration::ZERO);
        assert_eq!(u.fork, 3);
        assert_eq!(u.total(), 0.0);
    }

    #[test]
    fn utilization_formats_like_the_summary() {
        let times = TimeInState {
            available: Duration::from_millis(25),
            queued: Duration::ZERO,
            in_use: Duration::from_millis(25),
            eating: Duration::from_millis(50),
        };
        let u = ForkUtilization::from_times(0, &times, Duration::from_millis(100));
        assert_eq!(
            u.to_string(),
            "Fork-1: Available=25.00%, Queued=0.00%, InUse=25.00%, Eating=50.00%"
        );
    }

    #[test]
    fn aggregates() {
        let r = report(Outcome::Completed);
        assert_eq!(r.total_eaten(), 6);
        assert_eq!(r.total_thinking(), Duration::from_millis(200));
        assert_eq!(r.total_eating(), Duration::from_millis(300));
        assert!((r.throughput(0) - 0.004).abs() < 1e-12);
        assert!((r.throughput(1) - 0.002).abs() < 1e-12);
        assert!((r.average_throughput() - 0.003).abs() < 1e-12);
        assert_eq!(r.throughput(9), 0.0);
        assert!(!r.is_deadlock());
    }

    #[test]
    fn summary_names_fork_owners() {
        let text = report(Outcome::Completed).to_string();
        assert!(text.contains("Total eaten: 6"));
        assert!(text.contains(" Fork-1: InUse (is using by B)"));
        assert!(text.contains(" Fork-2: Available\n"));
        assert!(text.contains("Average: 0.003000"));
        assert!(text.ends_with("Score: 6\n"));
    }

    #[test]
    fn deadlock_description_lists_every_seat() {
        let seats = vec![
            SeatSnapshot {
                seat: 0,
                name: Arc::from("A"),
                state: PhilosopherState::Hungry,
                holds_left: true,
                holds_right: false,
            },
            SeatSnapshot {
                seat: 1,
                name: Arc::from("B"),
                state: PhilosopherState::Hungry,
                holds_left: true,
                holds_right: false,
            },
        ];
        let dl = DeadlockReport {
            at: Duration::from_millis(1500),
            seats,
        };
        let text = dl.to_string();
        assert!(text.contains("DEADLOCK DETECTED at 1.500s"));
        assert!(text.contains("  A: Left fork [HELD], Right fork [waiting]"));
        assert!(text.contains("  B: Left fork [HELD], Right fork [waiting]"));

        let r = report(Outcome::Deadlock(dl.clone()));
        assert!(r.is_deadlock());
        assert_eq!(r.deadlock(), Some(&dl));
    }

    #[test]
    fn status_block_shows_state_and_forks() {
        let r = report(Outcome::Completed);
        let seats = vec![SeatSnapshot::new(0, Arc::from("A"))];
        let text = status_block(Duration::from_millis(250), &r.philosophers, &seats, &r.forks);
        assert!(text.starts_with("===== TIME +0.250s ====="));
        assert!(text.contains(
            " A: eaten=4, thinking=100 ms, eatingTime=200 ms, failedAttempts=1 [Thinking, forks=0]"
        ));
        assert!(text.contains(" B: eaten=2"));
        assert!(text.contains("Forks:\n Fork-1: InUse (is using by B)"));
    }
}
