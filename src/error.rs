use thiserror::Error;

/// Failure to retrieve an upstream news page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Upstream HTTP status, if the remote end answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();

        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url,
            }
        } else {
            FetchError::Transport {
                url,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DateParseError {
    #[error("expected `day month year`, got {0:?}")]
    Format(String),

    #[error("unknown month {0:?}")]
    Month(String),

    #[error("invalid number: {0}")]
    Number(#[from] std::num::ParseIntError),

    #[error("no such date {0:?}")]
    OutOfRange(String),
}

/// Failure to load or save the durable feed cache.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("failed to open cache database: {0}")]
    Open(#[from] tokio_rusqlite::rusqlite::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("schema version {found}, expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("invalid feed key {0:?} in cache file")]
    InvalidKey(String),

    #[error("invalid timestamp {0} in cache file")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
#[error("failed to write feed document: {0}")]
pub struct RenderError(#[from] std::io::Error);
