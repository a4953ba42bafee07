use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recorder error: {0}")]
    Recorder(#[from] hlsrec_engine::RecorderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("{failed} segment(s) permanently failed")]
    IncompleteRecording { failed: usize },

    #[error("{failed} of {total} run(s) failed to remux")]
    IncompleteMerge { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;
