use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker count must be positive, got {0}")]
    InvalidWorkerCount(usize),

    #[error("empty task submitted")]
    EmptyTask,

    #[error("work queue is closed")]
    Closed,

    #[error("work queue was already closed")]
    AlreadyClosed,

    #[error("failed to start pool thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("idle registry is full")]
    RegistryFull,

    #[error("dispatcher thread exited before shutdown completed")]
    DispatcherLost,
}
