//! Fetch failures inside a transport adapter.

use thiserror::Error;

use crate::models::ErrorKind;

/// Failure of one fetch. Adapters fold these into the recorded attempt
/// rather than returning them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{0}")]
    Blocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Persisted error class for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::HttpStatus(_) => ErrorKind::HttpStatus,
            // A browser that never came up never reached the page either
            Self::Navigation(_) | Self::Browser(_) => ErrorKind::Navigation,
            Self::Blocked(_) => ErrorKind::Blocked,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Transport(format!("request timed out: {}", err));
        }
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Transport(message)
    }
}
