//! Error types for per-account operations and run setup
//!
//! Every network operation returns `Result<T, CheckinError>`. The retry
//! executor never inspects messages; it asks each error for its
//! [`Disposition`] and acts on that alone. Only configuration and input
//! errors are fatal to a run, everything else ends up as a per-account
//! failure in the report.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckinError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("Parsing error: {0}")]
    Parse(String),
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Already done: {0}")]
    AlreadyDone(String),
    #[error("Session rejected: {0}")]
    SessionExpired(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// How the retry executor should react to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// HTTP 429. Back off exponentially and try again.
    RateLimited,
    /// Connection trouble, 5xx, malformed bodies. Short delay and retry.
    Transient,
    /// Retrying cannot change the answer.
    Permanent,
}

impl CheckinError {
    pub fn disposition(&self) -> Disposition {
        match self {
            CheckinError::RateLimited(_) => Disposition::RateLimited,
            CheckinError::Network(_) | CheckinError::Server { .. } | CheckinError::Parse(_) => {
                Disposition::Transient
            }
            CheckinError::Validation(_)
            | CheckinError::Rejected(_)
            | CheckinError::AlreadyDone(_)
            | CheckinError::SessionExpired(_)
            | CheckinError::Config(_)
            | CheckinError::Io(_) => Disposition::Permanent,
        }
    }
}

impl From<std::io::Error> for CheckinError {
    fn from(err: std::io::Error) -> Self {
        CheckinError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for CheckinError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return CheckinError::RateLimited(err.to_string());
            }
            if status.is_server_error() {
                return CheckinError::Server {
                    status: status.as_u16(),
                    message: err.to_string(),
                };
            }
        }
        CheckinError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for CheckinError {
    fn from(err: serde_json::Error) -> Self {
        CheckinError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for CheckinError {
    fn from(err: serde_yaml::Error) -> Self {
        CheckinError::Config(err.to_string())
    }
}
