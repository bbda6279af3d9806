use std::{sync::Arc, time::Duration};

use forkwatch::{
    ArbitrationMode, Config, MealCounter, NaiveStrategy, OrderedStrategy, Simulation, StdoutSink,
    Strategy,
};

/// Five philosophers, two seconds, naive strategy.
///
/// Pass `ordered` to use the lowest-fork-first strategy and `arbiter` to
/// have both forks granted at once:
///
/// ```sh
/// cargo run --example dinner -- arbiter
/// ```
#[tokio::main]
async fn main() -> forkwatch::Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let has = |word: &str| args.iter().any(|a| a == word);

    let strategy: Arc<dyn Strategy> = if has("ordered") {
        Arc::new(OrderedStrategy)
    } else {
        Arc::new(NaiveStrategy)
    };
    let mode = if has("arbiter") {
        ArbitrationMode::Arbiter
    } else {
        ArbitrationMode::PerFork
    };

    let config = Config::default()
        .with_duration(Duration::from_secs(2))
        .with_status_interval(Duration::from_millis(500))
        .with_mode(mode);

    let meals = Arc::new(MealCounter::new());
    let mut sim = Simulation::new(["A", "B", "C", "D", "E"], config, strategy)?
        .with_sink(Arc::new(StdoutSink))
        .with_monitor(meals.clone());

    let report = sim.run().await?;
    println!(
        "{} meals in {} ms ({} observed), deadlock: {}",
        report.total_eaten(),
        report.elapsed.as_millis(),
        meals.meals(),
        report.is_deadlock()
    );
    Ok(())
}
