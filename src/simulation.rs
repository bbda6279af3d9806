use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    task::JoinSet,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::{
    ArbitrationMode, Config, DeadlockDetector, Error, Fork, Monitor, MetricsCollector, Outcome,
    Result, RingDetector, SeatSnapshot, SimulationReport, Sink, Strategy, TableManager,
    monitor::Monitors,
    observer::Observer,
    philosopher::{Hands, Philosopher, PhilosopherParts, SeatCell},
    table::ForkBoard,
};

/// Seats philosophers around a table and owns the run.
///
/// - `new(names, config, strategy)` validates the table and configuration.
/// - `with_sink`, `with_monitor` and `with_detector` attach collaborators.
/// - `run()` spawns one task per philosopher plus the observer and blocks
///   until the time budget elapses, a deadlock is confirmed, or the run is
///   stopped through its cancellation token. `run_for(budget)` does the same
///   with a budget other than [`Config::duration`].
/// - `report()` returns the final report of a finished run.
///
/// A simulation runs once; a second `run()` fails with
/// [`Error::AlreadyStarted`].
///
/// See also: [`Config`], [`Strategy`], [`Monitor`].
pub struct Simulation {
    names: Vec<Arc<str>>,
    config: Arc<Config>,
    strategy: Arc<dyn Strategy>,
    detector: Arc<dyn DeadlockDetector>,
    sink: Option<Arc<dyn Sink>>,
    monitors: Vec<Arc<dyn Monitor>>,
    metrics: Arc<MetricsCollector>,
    seats: Arc<[Arc<SeatCell>]>,
    cancel_token: CancellationToken,
    started: bool,
    report: Option<SimulationReport>,
}

impl Simulation {
    /// Create a simulation with one philosopher per name, seated in order.
    ///
    /// Fails if there are fewer than two names, if a name is blank, or if the
    /// configuration does not validate.
    pub fn new<I>(names: I, config: Config, strategy: Arc<dyn Strategy>) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        config.validate()?;
        let names: Vec<Arc<str>> = names
            .into_iter()
            .map(|name| Arc::from(name.as_ref()))
            .collect();
        if names.len() < 2 {
            return Err(Error::TooFewSeats(names.len()));
        }
        if let Some(seat) = names.iter().position(|name| name.trim().is_empty()) {
            return Err(Error::EmptyName(seat));
        }

        let seats: Arc<[Arc<SeatCell>]> = names
            .iter()
            .enumerate()
            .map(|(seat, name)| Arc::new(SeatCell::new(SeatSnapshot::new(seat, name.clone()))))
            .collect();

        Ok(Self {
            metrics: Arc::new(MetricsCollector::new(&names)),
            names,
            config: Arc::new(config),
            strategy,
            detector: Arc::new(RingDetector),
            sink: None,
            monitors: Vec::new(),
            seats,
            cancel_token: CancellationToken::new(),
            started: false,
            report: None,
        })
    }

    /// Send status blocks, the deadlock description and the final summary
    /// to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    /// Replace the default [`RingDetector`].
    pub fn with_detector(mut self, detector: Arc<dyn DeadlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Token that stops the run when cancelled. Clone it before calling
    /// [`run`](Self::run) to stop the simulation from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request the run to stop. Philosophers hand back their forks and the
    /// report is still produced.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Last published state of every philosopher, in seat order.
    pub fn seats(&self) -> Vec<SeatSnapshot> {
        self.seats.iter().map(|cell| cell.load()).collect()
    }

    /// Live per-philosopher counters.
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Final report of a finished run.
    pub fn report(&self) -> Option<&SimulationReport> {
        self.report.as_ref()
    }

    /// Run the simulation for [`Config::duration`] and return its final report.
    pub async fn run(&mut self) -> Result<SimulationReport> {
        let budget = self.config.duration;
        self.run_for(budget).await
    }

    /// Run the simulation for at most `budget`, ignoring the configured
    /// duration. A deadlock or [`stop`](Self::stop) still ends it earlier.
    pub async fn run_for(&mut self, budget: Duration) -> Result<SimulationReport> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let n = self.names.len();
        let origin = Instant::now();
        let board = match self.config.mode {
            ArbitrationMode::PerFork => ForkBoard::PerFork(
                (0..n)
                    .map(|id| Arc::new(Fork::with_origin(id, origin)))
                    .collect(),
            ),
            ArbitrationMode::Arbiter => {
                ForkBoard::Arbiter(Arc::new(TableManager::with_origin(n, origin)?))
            }
        };
        let monitors = Arc::new(Monitors::new(self.monitors.clone()));

        info!(
            philosophers = n,
            mode = %self.config.mode,
            strategy = self.strategy.name(),
            duration_ms = budget.as_millis() as u64,
            "simulation starting"
        );

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        for seat in 0..n {
            let (left, right) = (seat, (seat + 1) % n);
            let hands = match &board {
                ForkBoard::PerFork(forks) => Hands::PerFork {
                    left: forks[left].clone(),
                    right: forks[right].clone(),
                },
                ForkBoard::Arbiter(table) => Hands::Arbiter {
                    table: table.clone(),
                    left,
                    right,
                },
            };
            let name = self.names[seat].clone();
            let span = info_span!("philosopher", seat, name = %name);
            let philosopher = Philosopher::new(PhilosopherParts {
                seat,
                name,
                hands,
                strategy: self.strategy.clone(),
                config: self.config.clone(),
                metrics: self.metrics.clone(),
                monitors: monitors.clone(),
                published: self.seats[seat].clone(),
                cancel_token: self.cancel_token.clone(),
            });
            tasks.spawn(philosopher.run().instrument(span));
        }

        let observer = Observer {
            seats: self.seats.clone(),
            board: board.clone(),
            metrics: self.metrics.clone(),
            detector: self.detector.clone(),
            sink: self.sink.clone(),
            monitors: monitors.clone(),
            config: self.config.clone(),
            origin,
            cancel_token: self.cancel_token.clone(),
        };
        let observer = tokio::spawn(observer.run().instrument(info_span!("observer")));

        select! {
            _ = self.cancel_token.cancelled() => {}
            _ = sleep(budget) => {}
        }
        self.cancel_token.cancel();

        while let Some(res) = tasks.join_next().await {
            res??;
        }
        let deadlock = observer.await?;

        let report = SimulationReport {
            elapsed: origin.elapsed(),
            outcome: match deadlock {
                Some(report) => Outcome::Deadlock(report),
                None => Outcome::Completed,
            },
            mode: self.config.mode,
            strategy: self.strategy.name().to_string(),
            philosophers: self.metrics.summaries(),
            forks: board.status().await,
            utilization: board.utilization().await,
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&report.to_string()) {
                warn!(error = %e, "failed to write final summary");
            }
        }
        info!(
            eaten = report.total_eaten(),
            deadlock = report.is_deadlock(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "simulation finished"
        );

        self.report = Some(report.clone());
        Ok(report)
    }
}
