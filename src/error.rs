use thiserror::Error;

/// Errors surfaced by catalog operations.
///
/// Only whole-operation failures reach a caller. Per-line, per-channel and
/// per-probe failures are absorbed into a channel status or a skipped line.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Content does not start with the `#EXTM3U` marker
    #[error("Invalid playlist format: {0}")]
    Format(String),

    /// Content could not be decoded with the primary or the fallback encoding
    #[error("Unable to decode playlist: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// Snapshot could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout(err.to_string())
        } else if err.is_connect() {
            CatalogError::Connection(err.to_string())
        } else if err.is_builder() {
            CatalogError::MalformedUrl(err.to_string())
        } else {
            CatalogError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
