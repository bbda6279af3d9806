#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("A table needs at least two seats, got {0}.")]
    TooFewSeats(usize),

    #[error("Philosopher at seat {0} has an empty name.")]
    EmptyName(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Simulation has already been started.")]
    AlreadyStarted,

    #[error("Philosopher task join error: {0}")]
    ActorJoinError(#[from] tokio::task::JoinError),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}
