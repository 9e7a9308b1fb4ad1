//! Source adapter errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    /// Network hiccup, timeout, 429 or 5xx: worth retrying the same request
    #[error("Transient source error: {0}")]
    Transient(String),

    /// The source answered but refused the request (4xx other than 429)
    #[error("Source rejected request: {0}")]
    Rejected(String),

    #[error("Malformed source response: {0}")]
    MalformedResponse(String),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Invalid source configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return SourceError::Transient(err.to_string());
            }
            return SourceError::Rejected(err.to_string());
        }
        if err.is_decode() {
            return SourceError::MalformedResponse(err.to_string());
        }
        if err.is_builder() {
            return SourceError::Config(err.to_string());
        }
        SourceError::Transient(err.to_string())
    }
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => SourceError::Io(io),
            kind => SourceError::MalformedRow {
                line,
                reason: format!("{:?}", kind),
            },
        }
    }
}
