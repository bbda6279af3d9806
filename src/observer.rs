use std::sync::Arc;

use tokio::{
    select,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::{
    Config, DeadlockDetector, DeadlockReport, MetricsCollector, SeatSnapshot, Sink,
    monitor::Monitors, philosopher::SeatCell, report::status_block, table::ForkBoard,
};

/// Periodic status writer and deadlock poller.
///
/// Wakes every status interval, writes a status block to the sink and feeds
/// the published seat snapshots to the detector. Once the detector has
/// matched on enough consecutive polls the observer writes the deadlock
/// description, notifies the monitors and cancels the whole simulation.
pub(crate) struct Observer {
    pub seats: Arc<[Arc<SeatCell>]>,
    pub board: ForkBoard,
    pub metrics: Arc<MetricsCollector>,
    pub detector: Arc<dyn DeadlockDetector>,
    pub sink: Option<Arc<dyn Sink>>,
    pub monitors: Arc<Monitors>,
    pub config: Arc<Config>,
    pub origin: Instant,
    pub cancel_token: CancellationToken,
}

impl Observer {
    /// Poll until cancelled. Returns the deadlock that ended the run, if any.
    pub async fn run(self) -> Option<DeadlockReport> {
        let mut ticker = tokio::time::interval(self.config.effective_status_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let required = self.config.deadlock_confirmations.max(1);
        let mut streak = 0u32;

        loop {
            select! {
                biased;
                _ = self.cancel_token.cancelled() => return None,
                _ = ticker.tick() => {}
            }

            let seats = self.seats();
            self.write_status(&seats).await;

            if self.detector.is_deadlocked(&seats) {
                streak += 1;
                trace!(streak, required, "deadlock pattern observed");
            } else {
                streak = 0;
                trace!("poll clean");
            }

            if streak >= required {
                let report = DeadlockReport {
                    at: self.origin.elapsed(),
                    seats,
                };
                warn!(at_ms = report.at.as_millis() as u64, "deadlock detected");
                self.append(&report.to_string());
                self.monitors.deadlock(&report);
                info!("stopping simulation after deadlock");
                self.cancel_token.cancel();
                return Some(report);
            }
        }
    }

    fn seats(&self) -> Vec<SeatSnapshot> {
        self.seats.iter().map(|cell| cell.load()).collect()
    }

    async fn write_status(&self, seats: &[SeatSnapshot]) {
        if self.sink.is_none() {
            return;
        }
        let forks = self.board.status().await;
        let block = status_block(
            self.origin.elapsed(),
            &self.metrics.summaries(),
            seats,
            &forks,
        );
        self.append(&block);
    }

    fn append(&self, text: &str) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(text) {
                warn!(error = %e, "sink write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Fork, MemorySink, PhilosopherState, RingDetector};

    fn observer(
        cells: Vec<Arc<SeatCell>>,
        sink: Arc<MemorySink>,
        config: Config,
        token: CancellationToken,
    ) -> Observer {
        let n = cells.len();
        let names: Vec<Arc<str>> = cells.iter().map(|c| c.load().name).collect();
        let forks: Vec<Arc<Fork>> = (0..n).map(|id| Arc::new(Fork::new(id))).collect();
        Observer {
            seats: cells.into(),
            board: ForkBoard::PerFork(forks.into()),
            metrics: Arc::new(MetricsCollector::new(&names)),
            detector: Arc::new(RingDetector),
            sink: Some(sink),
            monitors: Arc::new(Monitors::default()),
            config: Arc::new(config),
            origin: Instant::now(),
            cancel_token: token,
        }
    }

    fn cell(seat: usize, state: PhilosopherState, left: bool) -> Arc<SeatCell> {
        Arc::new(SeatCell::new(SeatSnapshot {
            seat,
            name: Arc::from(format!("P{seat}")),
            state,
            holds_left: left,
            holds_right: false,
        }))
    }

    #[tokio::test]
    async fn fires_and_cancels_on_a_stuck_ring() {
        let cells = (0..3).map(|i| cell(i, PhilosopherState::Hungry, true)).collect();
        let sink = Arc::new(MemorySink::new());
        let token = CancellationToken::new();
        let config = Config::default().with_status_interval(Duration::from_millis(10));

        let report = observer(cells, sink.clone(), config, token.clone())
            .run()
            .await
            .expect("deadlock expected");

        assert!(token.is_cancelled());
        assert_eq!(report.seats.len(), 3);
        let text = sink.contents();
        assert!(text.contains("===== TIME"));
        assert!(text.contains("DEADLOCK DETECTED"));
    }

    #[tokio::test]
    async fn waits_for_the_required_number_of_confirmations() {
        let cells = (0..2).map(|i| cell(i, PhilosopherState::Hungry, true)).collect();
        let sink = Arc::new(MemorySink::new());
        let token = CancellationToken::new();
        let config = Config::default()
            .with_status_interval(Duration::from_millis(10))
            .with_deadlock_confirmations(3);

        observer(cells, sink.clone(), config, token.clone())
            .run()
            .await
            .expect("deadlock expected");

        let blocks = sink
            .chunks()
            .iter()
            .filter(|c| c.starts_with("===== TIME"))
            .count();
        assert_eq!(blocks, 3);
    }

    #[tokio::test]
    async fn healthy_table_runs_until_cancelled() {
        let cells = vec![
            cell(0, PhilosopherState::Hungry, true),
            cell(1, PhilosopherState::Thinking, false),
        ];
        let sink = Arc::new(MemorySink::new());
        let token = CancellationToken::new();
        let config = Config::default().with_status_interval(Duration::from_millis(10));
        let task = tokio::spawn(observer(cells, sink.clone(), config, token.clone()).run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        assert!(task.await.unwrap().is_none());
        assert!(!sink.contents().contains("DEADLOCK"));
        assert!(sink.chunks().len() >= 2);
    }
}
