//! Error types for the chapter store.

use thiserror::Error;

/// Errors that can occur during chapter store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chapter store is closed")]
    Closed,

    #[error("failed to open namespace {namespace}")]
    OpenFailed {
        namespace: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("failed to {operation} chapter {id}")]
    ChapterIo {
        operation: &'static str,
        id: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("invalid chapter data for {id}")]
    InvalidChapterData {
        id: String,
        #[source]
        source: Option<eyre::Report>,
    },
}

/// Result type alias for chapter store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
