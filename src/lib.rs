//! Forkwatch - dining philosophers with live deadlock detection
//!
//! Philosophers run as independent tokio tasks around a ring of forks,
//! acquiring them either one at a time through per-fork locks (where a
//! [`Strategy`] decides the order and circular waits are reachable) or two at
//! a time through a central [`TableManager`]. An observer task polls the
//! table, writes status blocks to a [`Sink`] and halts the run once a
//! [`DeadlockDetector`] confirms a circular wait. Every fork keeps
//! time-in-state accounting that feeds the final [`SimulationReport`].
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use forkwatch::{Config, NaiveStrategy, Simulation, StdoutSink};
//!
//! # async fn demo() -> forkwatch::Result {
//! let config = Config::default().with_duration(Duration::from_secs(2));
//! let mut sim = Simulation::new(["A", "B", "C", "D", "E"], config, Arc::new(NaiveStrategy))?
//!     .with_sink(Arc::new(StdoutSink));
//! let report = sim.run().await?;
//! println!("{} meals, deadlock: {}", report.total_eaten(), report.is_deadlock());
//! # Ok(())
//! # }
//! ```
//!
//! See `demos/dinner.rs`.

mod config;
mod detector;
mod error;
mod fork;
mod ledger;
mod metrics;
mod monitor;
mod observer;
mod philosopher;
mod report;
mod simulation;
mod sink;
mod strategy;
mod table;

pub use config::{ArbitrationMode, Config, DurationRange};
pub use detector::{DeadlockDetector, RingDetector};
pub use error::Error;
pub use fork::Fork;
pub use ledger::{ForkState, TimeInState};
pub use metrics::{MetricsCollector, PhilosopherSummary};
pub use monitor::{MealCounter, Monitor};
pub use philosopher::{PhilosopherState, PhilosopherView, SeatSnapshot};
pub use report::{DeadlockReport, ForkStatus, ForkUtilization, Outcome, SimulationReport};
pub use simulation::Simulation;
pub use sink::{FileSink, MemorySink, Sink, StdoutSink};
pub use strategy::{Action, NaiveStrategy, OrderedStrategy, Strategy};
pub use table::TableManager;

pub type Result<T = ()> = std::result::Result<T, Error>;
/// Seat index around the table, `0..n`.
pub type SeatId = usize;
/// Fork index. Seat `i` sits between fork `i` (left) and fork `(i + 1) % n` (right).
pub type ForkId = usize;
