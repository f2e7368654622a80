//! Server crate for the ReelRecs recommendation engine.
//!
//! The orchestrator serves personalized, similar-item and trending lists
//! from the published embedding generation, and degrades to popularity when
//! a user has no vector or a provider is unavailable.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::EngineConfig;
pub use error::{Result, ServingError};
pub use orchestrator::{MovieRecommendation, RecommendationOrchestrator, RecommendationSource};
