//! Training pipeline for the hybrid recommender.
//!
//! This crate provides:
//! - `IdMapping` and `InteractionMatrix`: users and items mapped to dense
//!   indices, interactions stored as a sparse weighted matrix
//! - `FeatureMatrix`: per-item identity column plus one column per tag
//! - `HybridTrainer`: WARP-loss factorization over users and item features
//! - `TrainingPipeline` / `train`: the above end to end, producing an
//!   `embedding_store::Generation`
//! - `Evaluator`: Recall@K on a held-out split, against a popularity baseline
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{Hyperparameters, TrainingPipeline};
//!
//! let index = data_loader::DataIndex::load_from_files(Path::new("data/ml-1m"))?;
//! let params = Hyperparameters::default().with_epochs(20).with_parallelism(4);
//!
//! let run = TrainingPipeline::new(params).run(&index.all_interactions(), &index.item_tags(), 42)?;
//! store.publish(run.generation);
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod interactions;
pub mod trainer;
pub mod training;

pub use config::{Hyperparameters, RatingPolicy, WeightPolicy};
pub use error::{Result, TrainingError};
pub use evaluation::{
    EvaluationReport, Evaluator, InteractionSplit, SplitStrategy, evaluate_generation, split_interactions,
};
pub use features::{FeatureMatrix, build_feature_matrix};
pub use interactions::{BuildReport, IdMapping, InteractionMatrix, build_interaction_matrix};
pub use trainer::{FactorizationModel, HybridTrainer};
pub use training::{TrainingPipeline, TrainingReport, TrainingRun, train};
