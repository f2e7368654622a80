//! Error types for the embedding store.

use thiserror::Error;

/// Errors raised while building, querying or persisting embedding generations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Embedding tables need at least one dimension
    #[error("Embedding dimensionality must be positive, got {0}")]
    InvalidDimensions(usize),

    /// A vector's length does not match the table it is written to or queried against
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A vector contained NaN or an infinity
    #[error("Vector for id {id} contains non-finite values")]
    NonFinite { id: u32 },

    /// A query vector contained NaN or an infinity
    #[error("Query vector contains non-finite values")]
    NonFiniteQuery,

    /// The same id appeared twice in a persisted table
    #[error("Duplicate id {0} in embedding table")]
    DuplicateId(u32),

    /// The metric name is not one of cosine, euclidean or dot
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// I/O error while reading or writing a generation file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A generation file could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, StoreError>;
