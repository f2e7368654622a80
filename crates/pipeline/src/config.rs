//! Training configuration.
//!
//! [`Hyperparameters`] controls the factorization itself; [`WeightPolicy`]
//! decides how each interaction record turns into a positive weight.

use crate::error::{Result, TrainingError};
use data_loader::{DEFAULT_IMPLICIT_WEIGHT, Interaction};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hyperparameters of the hybrid factorization trainer.
///
/// ## Defaults
/// - 64 dimensions, 100 passes
/// - learning rate 0.05 with decay 0.02 per pass
/// - up to 10 negative samples per positive, margin 1.0
/// - no regularization, a single shard, no time ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub dimensions: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    /// Pass `p` trains with `learning_rate / (1 + learning_rate_decay * p)`
    pub learning_rate_decay: f32,
    /// Maximum negatives drawn per positive before giving up on it
    pub negative_samples: usize,
    pub margin: f32,
    /// L2 penalty applied to every row an update touches
    pub regularization: f32,
    /// Number of user shards trained concurrently per pass
    pub parallelism: usize,
    /// Wall-clock ceiling for the whole run
    pub max_duration: Option<Duration>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            dimensions: 64,
            epochs: 100,
            learning_rate: 0.05,
            learning_rate_decay: 0.02,
            negative_samples: 10,
            margin: 1.0,
            regularization: 0.0,
            parallelism: 1,
            max_duration: None,
        }
    }
}

impl Hyperparameters {
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_learning_rate_decay(mut self, decay: f32) -> Self {
        self.learning_rate_decay = decay;
        self
    }

    pub fn with_negative_samples(mut self, negative_samples: usize) -> Self {
        self.negative_samples = negative_samples;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_regularization(mut self, regularization: f32) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Reject values the trainer cannot run with
    pub fn validate(&self) -> Result<()> {
        positive_count("dimensions", self.dimensions)?;
        positive_count("epochs", self.epochs)?;
        positive_count("negative_samples", self.negative_samples)?;
        positive_count("parallelism", self.parallelism)?;

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate));
        }
        if !(self.learning_rate_decay.is_finite() && self.learning_rate_decay >= 0.0) {
            return Err(invalid("learning_rate_decay", self.learning_rate_decay));
        }
        if !(self.margin.is_finite() && self.margin > 0.0) {
            return Err(invalid("margin", self.margin));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(invalid("regularization", self.regularization));
        }
        if self.max_duration == Some(Duration::ZERO) {
            return Err(invalid("max_duration", "0s"));
        }
        Ok(())
    }
}

fn positive_count(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(invalid(name, value));
    }
    Ok(())
}

fn invalid(name: &'static str, value: impl ToString) -> TrainingError {
    TrainingError::InvalidHyperparameter {
        name,
        value: value.to_string(),
    }
}

/// How explicit ratings become interaction weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RatingPolicy {
    /// The rating itself is the weight
    Direct,
    /// `(rating - min + 1) / (max - min + 1)`, so the lowest rating still
    /// counts as a (weak) positive
    Rescaled { min: f32, max: f32 },
    /// Every rating counts as a plain positive
    Binary,
}

impl Default for RatingPolicy {
    fn default() -> Self {
        RatingPolicy::Rescaled {
            min: data_loader::RATING_MIN,
            max: data_loader::RATING_MAX,
        }
    }
}

/// Maps interaction records to training weights.
///
/// An explicit weight on the record always wins. Otherwise ratings go through
/// the [`RatingPolicy`] and implicit feedback gets `implicit_weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightPolicy {
    pub ratings: RatingPolicy,
    pub implicit_weight: f32,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            ratings: RatingPolicy::default(),
            implicit_weight: DEFAULT_IMPLICIT_WEIGHT,
        }
    }
}

impl WeightPolicy {
    pub fn with_ratings(mut self, ratings: RatingPolicy) -> Self {
        self.ratings = ratings;
        self
    }

    pub fn with_implicit_weight(mut self, weight: f32) -> Self {
        self.implicit_weight = weight;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.implicit_weight.is_finite() && self.implicit_weight > 0.0) {
            return Err(invalid("implicit_weight", self.implicit_weight));
        }
        if let RatingPolicy::Rescaled { min, max } = self.ratings
            && !(min.is_finite() && max.is_finite() && max > min)
        {
            return Err(invalid("rating_range", format!("{min}..{max}")));
        }
        Ok(())
    }

    /// Weight of one interaction; may be non-positive for out-of-range ratings
    pub fn weight(&self, interaction: &Interaction) -> f32 {
        if let Some(weight) = interaction.weight {
            return weight;
        }
        match interaction.rating {
            Some(rating) => match self.ratings {
                RatingPolicy::Direct => rating,
                RatingPolicy::Rescaled { min, max } => (rating - min + 1.0) / (max - min + 1.0),
                RatingPolicy::Binary => 1.0,
            },
            None => self.implicit_weight,
        }
    }
}
