//! Error types for the Slate core crate.

use thiserror::Error;

/// Top-level error type for all Slate core operations.
#[derive(Debug, Error)]
pub enum SlateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("a sync session is already running")]
    SyncInProgress,

    #[error("sync session exceeded its {0}s time budget")]
    Timeout(u64),
}

/// How a single page fetch against the source API failed.
///
/// The sync engine treats the variants differently: `Transient` is retried
/// at the same offset, `Auth` aborts the whole session, and `Malformed`
/// skips the page and fails only the entity type it occurred on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient source error: {0}")]
    Transient(String),

    #[error("source rejected credentials: {0}")]
    Auth(String),

    #[error("malformed source response: {0}")]
    Malformed(String),
}

/// A convenience Result alias that defaults to [`SlateError`].
pub type Result<T> = std::result::Result<T, SlateError>;
