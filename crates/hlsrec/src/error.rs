use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recording cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("ledger error at line {line}: {reason}")]
    Ledger { line: usize, reason: String },

    #[error("playlist unreachable after {retries} consecutive failed refreshes")]
    RetryBudgetExhausted { retries: u32 },

    #[error("segment #{index} failed after {attempts} attempts: {reason}")]
    SegmentFailed {
        index: u64,
        attempts: u32,
        reason: String,
    },

    #[error("remux of run starting at #{first_index} failed: {reason}")]
    Remux { first_index: u64, reason: String },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl RecorderError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether a segment download that produced this error should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::Timeout { .. }
            | Self::Io { .. } => true,
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Playlist { .. }
            | Self::Ledger { .. }
            | Self::RetryBudgetExhausted { .. }
            | Self::SegmentFailed { .. }
            | Self::Remux { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Errors that end a recording outright rather than being absorbed by a retry loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RetryBudgetExhausted { .. } | Self::Cancelled | Self::Ledger { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
