//! Error types for the training pipeline and evaluation harness.
//!
//! Every variant except `Store` is raised before any gradient step is taken,
//! so a failed run never leaves a partial generation behind.

use embedding_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    /// A hyperparameter is zero, negative or not finite
    #[error("Invalid hyperparameter {name}: {value}")]
    InvalidHyperparameter { name: &'static str, value: String },

    /// Nothing to learn from: no interactions, or none with a positive weight
    #[error("No training signal: {0}")]
    NoTrainingSignal(String),

    /// Inputs are malformed or inconsistent with each other
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The wall-clock ceiling was hit before all passes finished
    #[error("Training exceeded its time budget after {passes_completed} of {passes} passes")]
    DeadlineExceeded { passes_completed: usize, passes: usize },

    /// Assembling the generation from trained vectors failed
    #[error("Failed to assemble embedding generation: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, TrainingError>;
