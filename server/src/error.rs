use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("State actor is no longer running")]
    ActorUnavailable,

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
