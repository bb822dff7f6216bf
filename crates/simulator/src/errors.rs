use thiserror::Error;

/// Errors that can stop a simulation run.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no value supplied for {0}")]
    MissingValue(&'static str),

    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker task failed to join (worker panicked): {0}")]
    Join(#[from] tokio::task::JoinError),
}
