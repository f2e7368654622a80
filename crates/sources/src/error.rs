//! Error types for external data collaborators.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The collaborator could not answer (down, timed out, no data)
    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    /// The request itself was malformed
    #[error("Invalid request to {source_name}: {reason}")]
    InvalidRequest { source_name: String, reason: String },
}

impl SourceError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::InvalidRequest {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SourceError>;
