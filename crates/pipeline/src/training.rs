//! End-to-end training: interactions and catalog tags in, a complete
//! [`Generation`] out.

use crate::config::{Hyperparameters, WeightPolicy};
use crate::error::{Result, TrainingError};
use crate::features::build_feature_matrix;
use crate::interactions::{BuildReport, build_interaction_matrix, item_mapping, user_mapping};
use crate::trainer::HybridTrainer;
use data_loader::{Interaction, MovieId};
use embedding_store::{EmbeddingTable, Generation};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Summary of one training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub users: usize,
    pub items: usize,
    pub tags: usize,
    pub matrix: BuildReport,
    pub passes: usize,
    pub elapsed: Duration,
}

/// A trained, not yet published generation with its report
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub generation: Generation,
    pub report: TrainingReport,
}

/// Hyperparameters plus weight policy, reusable across runs.
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    hyperparameters: Hyperparameters,
    weights: WeightPolicy,
}

impl TrainingPipeline {
    pub fn new(hyperparameters: Hyperparameters) -> Self {
        Self {
            hyperparameters,
            weights: WeightPolicy::default(),
        }
    }

    pub fn with_weight_policy(mut self, weights: WeightPolicy) -> Self {
        self.weights = weights;
        self
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn weight_policy(&self) -> &WeightPolicy {
        &self.weights
    }

    /// Train on `interactions` against a catalog described by `item_tags`.
    ///
    /// Every user with at least one usable interaction and every catalog or
    /// interacted item gets an embedding. Nothing is returned unless all
    /// passes complete.
    #[instrument(skip_all, fields(interactions = interactions.len(), catalog = item_tags.len(), seed = seed))]
    pub fn run(
        &self,
        interactions: &[Interaction],
        item_tags: &HashMap<MovieId, Vec<String>>,
        seed: u64,
    ) -> Result<TrainingRun> {
        let trainer = HybridTrainer::new(self.hyperparameters.clone(), seed)?;
        self.weights.validate()?;

        if interactions.is_empty() {
            return Err(TrainingError::NoTrainingSignal("no interactions supplied".to_string()));
        }

        let start = Instant::now();
        let users = user_mapping(interactions);
        let items = item_mapping(item_tags.keys().copied(), interactions);
        let (matrix, matrix_report) = build_interaction_matrix(interactions, &users, &items, &self.weights);
        if matrix.is_empty() {
            return Err(TrainingError::NoTrainingSignal(format!(
                "none of {} interactions has a positive weight",
                interactions.len()
            )));
        }
        let (features, vocabulary) = build_feature_matrix(item_tags, &items);

        let model = trainer.fit(&matrix, &features)?;
        let dimensions = model.dimensions();

        // Users whose only records were dropped keep no vector
        let mut user_table = EmbeddingTable::with_capacity(dimensions, users.len())?;
        for (index, &id) in users.ids().iter().enumerate() {
            if !matrix.row(index).0.is_empty() {
                user_table.upsert(id, model.user_vector(index))?;
            }
        }

        let mut item_table = EmbeddingTable::with_capacity(dimensions, items.len())?;
        for (index, &id) in items.ids().iter().enumerate() {
            item_table.upsert(id, &model.item_vector(&features, index))?;
        }

        let mut tag_table = EmbeddingTable::with_capacity(dimensions, vocabulary.len())?;
        for (column, _) in vocabulary.iter() {
            tag_table.upsert(column as u32, model.feature_vector(column))?;
        }

        let report = TrainingReport {
            users: user_table.len(),
            items: item_table.len(),
            tags: vocabulary.len(),
            matrix: matrix_report,
            passes: model.passes(),
            elapsed: start.elapsed(),
        };
        let generation = Generation::new(dimensions, user_table, item_table, tag_table, vocabulary)?;

        info!(
            users = report.users,
            items = report.items,
            tags = report.tags,
            passes = report.passes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Training complete"
        );

        Ok(TrainingRun { generation, report })
    }
}

/// Train with the default weight policy
pub fn train(
    interactions: &[Interaction],
    item_tags: &HashMap<MovieId, Vec<String>>,
    hyperparameters: &Hyperparameters,
    seed: u64,
) -> Result<Generation> {
    TrainingPipeline::new(hyperparameters.clone())
        .run(interactions, item_tags, seed)
        .map(|run| run.generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatingPolicy;

    fn item_tags() -> HashMap<MovieId, Vec<String>> {
        HashMap::from([
            (1, vec!["Action".to_string()]),
            (2, vec!["Action".to_string()]),
            (3, vec!["Drama".to_string()]),
            (4, Vec::new()),
        ])
    }

    fn small_params() -> Hyperparameters {
        Hyperparameters::default().with_dimensions(4).with_epochs(3)
    }

    #[test]
    fn test_every_catalog_item_gets_a_vector() {
        let interactions = vec![Interaction::rating(10, 1, 5.0, 0), Interaction::rating(11, 3, 4.0, 0)];

        let generation = train(&interactions, &item_tags(), &small_params(), 7).unwrap();

        assert_eq!(generation.dimensions(), 4);
        assert_eq!(generation.users().ids(), &[10, 11]);
        assert_eq!(generation.items().ids(), &[1, 2, 3, 4]);
        assert_eq!(generation.vocabulary().first_column(), 4);
        assert_eq!(generation.tag_embeddings().len(), 2);
    }

    #[test]
    fn test_item_vector_is_identity_plus_tags() {
        let interactions = vec![Interaction::rating(10, 1, 5.0, 0), Interaction::rating(10, 3, 4.0, 0)];
        let run = TrainingPipeline::new(small_params())
            .run(&interactions, &item_tags(), 3)
            .unwrap();
        let generation = &run.generation;

        // Items 1 and 2 share only the Action tag; their difference is the
        // difference of their identity embeddings, which a tag-only vector lacks
        let action = generation.embed_tags(&["Action"]).unwrap();
        let item = generation.items().get(2).unwrap();
        assert_ne!(item, action.as_slice());
        assert_eq!(run.report.passes, 3);
    }

    #[test]
    fn test_interactions_with_uncatalogued_items_still_train() {
        let interactions = vec![Interaction::rating(10, 42, 5.0, 0), Interaction::rating(10, 1, 5.0, 0)];

        let generation = train(&interactions, &item_tags(), &small_params(), 1).unwrap();

        assert!(generation.items().contains(42));
    }

    #[test]
    fn test_empty_interactions_fail() {
        assert!(matches!(
            train(&[], &item_tags(), &small_params(), 1),
            Err(TrainingError::NoTrainingSignal(_))
        ));
    }

    #[test]
    fn test_all_non_positive_weights_fail() {
        let interactions = vec![Interaction::rating(10, 1, 0.0, 0)];
        let pipeline = TrainingPipeline::new(small_params())
            .with_weight_policy(WeightPolicy::default().with_ratings(RatingPolicy::Direct));

        assert!(matches!(
            pipeline.run(&interactions, &item_tags(), 1),
            Err(TrainingError::NoTrainingSignal(_))
        ));
    }

    #[test]
    fn test_invalid_hyperparameters_fail_before_training() {
        let interactions = vec![Interaction::rating(10, 1, 5.0, 0)];
        let params = small_params().with_dimensions(0);

        assert!(matches!(
            train(&interactions, &item_tags(), &params, 1),
            Err(TrainingError::InvalidHyperparameter { name: "dimensions", .. })
        ));
    }

    #[test]
    fn test_same_seed_same_generation() {
        let interactions = vec![
            Interaction::rating(10, 1, 5.0, 0),
            Interaction::rating(11, 2, 3.0, 0),
            Interaction::rating(12, 3, 4.0, 0),
        ];

        let first = train(&interactions, &item_tags(), &small_params(), 11).unwrap();
        let second = train(&interactions, &item_tags(), &small_params(), 11).unwrap();

        assert_eq!(first, second);
    }
}
