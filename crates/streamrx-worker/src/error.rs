use streamrx_pipeline::PipelineError;

/// Errors that can occur while talking to a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker was never started, has exited, or stopped answering.
    #[error("worker unavailable")]
    Unavailable,

    /// The worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker answered out of protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The worker-side pipeline failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
