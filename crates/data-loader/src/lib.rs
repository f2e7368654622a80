//! # Data Loader Crate
//!
//! This crate owns the catalog side of the recommender: movies with their
//! category tags, users, and the interaction log.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (User, Movie, Interaction, DataIndex)
//! - **parser**: Parse MovieLens .dat files into Rust structs
//! - **index**: Load, aggregate and validate the DataIndex
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::DataIndex;
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_files(Path::new("data/ml-1m"))?;
//!
//! let movie = index.get_movie(1193).unwrap();
//! let history = index.get_user_interactions(1);
//!
//! println!("{} has tags {:?}; user 1 has {} interactions", movie.title, movie.genres, history.len());
//! ```

pub mod error;
pub mod types;
pub mod parser;
pub mod index;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use types::{
    // Type aliases
    UserId,
    MovieId,
    Timestamp,
    // Core types
    User,
    Movie,
    Interaction,
    FeedbackKind,
    DataIndex,
    MovieStats,
    // Constants
    DEFAULT_IMPLICIT_WEIGHT,
    RATING_MAX,
    RATING_MIN,
};
