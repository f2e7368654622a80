//! # Sources Crate
//!
//! Contracts for the external collaborators the recommender consumes, plus
//! implementations backed by the in-memory catalog.
//!
//! ## Components
//!
//! ### Popularity
//! `PopularityProvider` returns per-item interaction counts and mean
//! ratings over a trailing window. It powers trending lists and the
//! cold-start fallback. `CatalogPopularity` computes it from a `DataIndex`.
//!
//! ### Metadata
//! `MetadataProvider` supplies titles, tags, overviews and image references
//! used to decorate served results. `CatalogMetadata` reads the catalog.
//!
//! Both traits are synchronous; the serving layer runs them on the blocking
//! pool under a timeout.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{CatalogPopularity, PopularityProvider, TrendingWindow};
//! use data_loader::DataIndex;
//! use std::sync::Arc;
//!
//! let data_index = Arc::new(DataIndex::load_from_files(Path::new("data/ml-1m"))?);
//! let popularity = CatalogPopularity::new(data_index.clone());
//!
//! let trending = popularity.popularity(TrendingWindow::days(30))?;
//! ```

pub mod error;
pub mod metadata;
pub mod popularity;
pub mod types;

pub use error::{Result, SourceError};
pub use metadata::{CatalogMetadata, MetadataProvider};
pub use popularity::{CatalogPopularity, PopularityProvider};
pub use types::{ItemMetadata, PopularityStats, TrendingWindow};
