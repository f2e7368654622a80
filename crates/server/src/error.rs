//! Errors surfaced by the serving layer.
//!
//! A user without an embedding is not an error: it is served from the
//! popularity fallback.

use embedding_store::StoreError;
use pipeline::TrainingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServingError {
    /// The queried id has no stored embedding
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },

    /// No data source could answer and no cached answer exists
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Embedding store error: {0}")]
    Store(#[from] StoreError),

    /// A background task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ServingError>;
