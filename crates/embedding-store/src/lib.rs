//! # Embedding Store Crate
//!
//! Persistence and similarity search for trained user and item embeddings.
//!
//! ## Components
//!
//! - **table**: `EmbeddingTable`, a fixed-dimension arena with O(1) lookup by
//!   id and exact top-k search with caller-supplied exclusions
//! - **metric**: cosine, Euclidean and dot-product scoring
//! - **generation**: `Generation`, one training run's complete output plus its
//!   tag vocabulary, saved and loaded as a unit
//! - **store**: `EmbeddingStore`, the atomically swappable "current model"
//!
//! ## Example Usage
//!
//! ```ignore
//! use embedding_store::{EmbeddingStore, Generation, Metric};
//! use std::collections::HashSet;
//!
//! let store = EmbeddingStore::new();
//! let id = store.publish(Generation::load(Path::new("model.json"))?);
//!
//! let generation = store.current().unwrap();
//! let query = generation.items().get(1).unwrap();
//! let exclude: HashSet<u32> = [1].into_iter().collect();
//! let similar = generation.items().nearest(query, 10, &exclude, Metric::Cosine)?;
//! ```

pub mod error;
pub mod generation;
pub mod metric;
pub mod store;
pub mod table;

pub use error::{Result, StoreError};
pub use generation::{Generation, GenerationId, TagVocabulary, VOCABULARY_VERSION};
pub use metric::Metric;
pub use store::EmbeddingStore;
pub use table::{EmbeddingTable, Neighbor};
