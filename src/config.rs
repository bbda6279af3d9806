use std::{fmt, time::Duration};

use rand::Rng;

use crate::{Error, Result};

/// How philosophers obtain their forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArbitrationMode {
    /// Every fork carries its own lock and forks are taken one at a time,
    /// as the [`Strategy`](crate::Strategy) decides. Circular waits are reachable.
    #[default]
    PerFork,
    /// A single [`TableManager`](crate::TableManager) grants both forks at once
    /// or neither. Circular partial holding cannot happen.
    Arbiter,
}

impl fmt::Display for ArbitrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbitrationMode::PerFork => write!(f, "per-fork"),
            ArbitrationMode::Arbiter => write!(f, "arbiter"),
        }
    }
}

/// Inclusive `[min, max]` range a randomized duration is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DurationRange {
    pub min: Duration,
    pub max: Duration,
}

impl DurationRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// A range that always yields `d`.
    pub const fn fixed(d: Duration) -> Self {
        Self::new(d, d)
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Draw a duration uniformly from the range.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        let min = self.min.as_nanos() as u64;
        let max = self.max.as_nanos() as u64;
        Duration::from_nanos(rng.random_range(min..=max))
    }
}

impl fmt::Display for DurationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, {:?}]", self.min, self.max)
    }
}

/// Runtime configuration for a [`Simulation`](crate::Simulation).
///
/// Use the builder methods to customize, or [`Default`] for the values the
/// classic five-philosopher table runs with.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use forkwatch::{ArbitrationMode, Config, DurationRange};
///
/// let config = Config::default()
///     .with_think(DurationRange::from_millis(30, 100))
///     .with_eat(DurationRange::from_millis(40, 60))
///     .with_duration(Duration::from_secs(2))
///     .with_mode(ArbitrationMode::PerFork);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// How long a philosopher thinks before getting hungry.
    /// Default: 30..=100 ms
    pub think: DurationRange,

    /// How long a philosopher eats once both forks are held.
    /// Default: 40..=60 ms
    pub eat: DurationRange,

    /// Handling cost paid after each successful single-fork acquisition,
    /// before the philosopher considers the fork in hand.
    /// Default: 20 ms
    pub acquire_latency: Duration,

    /// Upper bound on the wait for a fork's internal lock.
    /// Default: 100 ms
    pub acquire_timeout: Duration,

    /// Back-off between acquisition attempts while hungry.
    /// Default: 5 ms
    pub retry_delay: Duration,

    /// Total run duration. The run ends earlier if a deadlock is confirmed.
    /// Default: 60 s
    pub duration: Duration,

    /// Interval between status blocks and deadlock polls.
    /// Default: 250 ms
    pub status_interval: Duration,

    /// Fork arbitration mode.
    /// Default: [`ArbitrationMode::PerFork`]
    pub mode: ArbitrationMode,

    /// Consecutive polls that must all observe the deadlock pattern before
    /// the run is halted. `1` fires on the first matching sample.
    /// Default: 1
    pub deadlock_confirmations: u32,

    /// Seed for duration draws. `None` seeds every philosopher from the OS.
    /// Default: None
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            think: DurationRange::from_millis(30, 100),
            eat: DurationRange::from_millis(40, 60),
            acquire_latency: Duration::from_millis(20),
            acquire_timeout: Duration::from_millis(100),
            retry_delay: Duration::from_millis(5),
            duration: Duration::from_secs(60),
            status_interval: Duration::from_millis(250),
            mode: ArbitrationMode::PerFork,
            deadlock_confirmations: 1,
            seed: None,
        }
    }
}

impl Config {
    pub(crate) const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(10);

    pub fn with_think(mut self, range: DurationRange) -> Self {
        self.think = range;
        self
    }

    pub fn with_eat(mut self, range: DurationRange) -> Self {
        self.eat = range;
        self
    }

    pub fn with_acquire_latency(mut self, latency: Duration) -> Self {
        self.acquire_latency = latency;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the status/deadlock polling interval.
    ///
    /// Values below 10 ms are raised to 10 ms when the observer starts.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_mode(mut self, mode: ArbitrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Require `n` consecutive matching polls before a deadlock is reported.
    ///
    /// Trade-offs:
    /// - `1`: reports as early as possible, but a snapshot that an in-flight
    ///   release is about to resolve is reported as a deadlock too
    /// - `2` and above: filters such momentary patterns at the cost of
    ///   `n - 1` extra polling intervals of latency
    pub fn with_deadlock_confirmations(mut self, n: u32) -> Self {
        self.deadlock_confirmations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn effective_status_interval(&self) -> Duration {
        self.status_interval.max(Self::MIN_STATUS_INTERVAL)
    }

    /// Check the configuration for values no simulation can run with.
    pub fn validate(&self) -> Result {
        if !self.think.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "thinking range {} is inverted",
                self.think
            )));
        }
        if !self.eat.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "eating range {} is inverted",
                self.eat
            )));
        }
        if self.status_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "status interval must be positive".into(),
            ));
        }
        if self.deadlock_confirmations == 0 {
            return Err(Error::InvalidConfig(
                "deadlock confirmations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let config = Config::default().with_eat(DurationRange::from_millis(60, 40));
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config::default().with_status_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_confirmations_is_rejected() {
        let config = Config::default().with_deadlock_confirmations(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_interval_is_clamped() {
        let config = Config::default().with_status_interval(Duration::from_millis(1));
        assert_eq!(config.effective_status_interval(), Duration::from_millis(10));
    }

    #[test]
    fn samples_stay_in_range() {
        let range = DurationRange::from_millis(30, 100);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min && d <= range.max, "{d:?} out of {range}");
        }
    }

    #[test]
    fn fixed_range_yields_constant() {
        let range = DurationRange::fixed(Duration::from_millis(5));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(range.sample(&mut rng), Duration::from_millis(5));
    }
}
