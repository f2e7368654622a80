//! Hybrid matrix factorization with the WARP ranking loss.
//!
//! ## Model
//! Users get one free embedding each. Items are represented only through
//! their feature columns (see [`crate::features`]): the effective item vector
//! is the sum of the embeddings of the item's features. A user's affinity for
//! an item is the dot product of the two vectors.
//!
//! ## Training
//! For every positive (user, item) pair, negatives are drawn uniformly from
//! the items the user has not interacted with until one scores within
//! `margin` of the positive. The update is scaled by
//! `ln(max(1, (n_items - 1) / trials))`, so violations found early, which
//! suggest the positive is ranked far down the list, push harder.
//!
//! ## Parallelism
//! Users are split into `parallelism` contiguous shards. Each shard owns its
//! users' rows outright and trains against a private copy of the feature
//! embeddings; at the end of a pass the shards' feature deltas are summed in
//! shard order. A single RNG seeded once per run initializes the embeddings
//! and then hands every shard of every pass a seed of its own, so a run is
//! reproducible for a fixed seed and shard count.

use crate::config::Hyperparameters;
use crate::error::{Result, TrainingError};
use crate::features::FeatureMatrix;
use crate::interactions::InteractionMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Width of the uniform interval initial embeddings are drawn from
const INIT_SCALE: f32 = 0.01;

/// Trained user and feature embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorizationModel {
    dimensions: usize,
    user_embeddings: Vec<f32>,
    feature_embeddings: Vec<f32>,
    passes: usize,
}

impl FactorizationModel {
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn n_users(&self) -> usize {
        self.user_embeddings.len() / self.dimensions
    }

    pub fn n_features(&self) -> usize {
        self.feature_embeddings.len() / self.dimensions
    }

    /// Passes completed
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn user_vector(&self, user: usize) -> &[f32] {
        row(&self.user_embeddings, self.dimensions, user)
    }

    pub fn feature_vector(&self, feature: usize) -> &[f32] {
        row(&self.feature_embeddings, self.dimensions, feature)
    }

    /// Effective embedding of an item: the sum of its feature embeddings
    pub fn item_vector(&self, features: &FeatureMatrix, item: usize) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        accumulate_item(&self.feature_embeddings, self.dimensions, features.row(item), &mut vector);
        vector
    }

    /// Affinity of a user for an item
    pub fn score(&self, features: &FeatureMatrix, user: usize, item: usize) -> f32 {
        let item = self.item_vector(features, item);
        dot(self.user_vector(user), &item)
    }
}

/// Fits a [`FactorizationModel`] to an interaction matrix.
#[derive(Debug, Clone)]
pub struct HybridTrainer {
    params: Hyperparameters,
    seed: u64,
}

/// Per-shard counters for one pass
#[derive(Debug, Clone, Copy, Default)]
struct ShardStats {
    positives: usize,
    updates: usize,
    skipped_users: usize,
}

impl HybridTrainer {
    /// Create a trainer; fails if the hyperparameters are unusable
    pub fn new(params: Hyperparameters, seed: u64) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, seed })
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    #[instrument(skip_all, fields(users = interactions.n_rows(), items = interactions.n_cols()))]
    pub fn fit(&self, interactions: &InteractionMatrix, features: &FeatureMatrix) -> Result<FactorizationModel> {
        if interactions.n_cols() != features.n_items() {
            return Err(TrainingError::InvalidInput(format!(
                "interaction matrix has {} items but feature matrix has {}",
                interactions.n_cols(),
                features.n_items()
            )));
        }
        if interactions.is_empty() {
            return Err(TrainingError::NoTrainingSignal(
                "interaction matrix has no positive cells".to_string(),
            ));
        }

        let params = &self.params;
        let dimensions = params.dimensions;
        let n_users = interactions.n_rows();
        let start = Instant::now();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut user_embeddings = initial_embeddings(&mut rng, n_users, dimensions);
        let mut feature_embeddings = initial_embeddings(&mut rng, features.n_features(), dimensions);

        let shard_users = n_users.div_ceil(params.parallelism);
        let n_shards = n_users.div_ceil(shard_users);

        info!(
            nnz = interactions.nnz(),
            features = features.n_features(),
            dimensions,
            epochs = params.epochs,
            shards = n_shards,
            "Starting factorization"
        );

        for pass in 0..params.epochs {
            if let Some(limit) = params.max_duration
                && start.elapsed() > limit
            {
                return Err(TrainingError::DeadlineExceeded {
                    passes_completed: pass,
                    passes: params.epochs,
                });
            }

            let learning_rate = params.learning_rate / (1.0 + params.learning_rate_decay * pass as f32);
            let snapshot = &feature_embeddings;
            let seeds = shard_seeds(&mut rng, n_shards);

            let outcomes: Vec<(Vec<f32>, ShardStats)> = user_embeddings
                .par_chunks_mut(shard_users * dimensions)
                .enumerate()
                .map(|(shard, user_rows)| {
                    let mut local = snapshot.clone();
                    let mut shard_rng = StdRng::seed_from_u64(seeds[shard]);
                    let stats = train_shard(
                        params,
                        learning_rate,
                        interactions,
                        features,
                        shard * shard_users,
                        user_rows,
                        &mut local,
                        &mut shard_rng,
                    );
                    (local, stats)
                })
                .collect();

            let mut totals = ShardStats::default();
            for (_, stats) in &outcomes {
                totals.positives += stats.positives;
                totals.updates += stats.updates;
                totals.skipped_users += stats.skipped_users;
            }
            feature_embeddings = merge_shards(snapshot, outcomes);

            info!(
                pass = pass + 1,
                learning_rate,
                positives = totals.positives,
                updates = totals.updates,
                skipped_users = totals.skipped_users,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Completed training pass"
            );
        }

        Ok(FactorizationModel {
            dimensions,
            user_embeddings,
            feature_embeddings,
            passes: params.epochs,
        })
    }
}

/// Uniform values in `[-INIT_SCALE / 2, INIT_SCALE / 2)`
fn initial_embeddings(rng: &mut StdRng, rows: usize, dimensions: usize) -> Vec<f32> {
    (0..rows * dimensions)
        .map(|_| (rng.random::<f32>() - 0.5) * INIT_SCALE)
        .collect()
}

/// One seed per shard for the coming pass
fn shard_seeds(rng: &mut StdRng, shards: usize) -> Vec<u64> {
    (0..shards).map(|_| rng.random()).collect()
}

/// Apply every shard's feature delta to the snapshot, in shard order
fn merge_shards(snapshot: &[f32], mut outcomes: Vec<(Vec<f32>, ShardStats)>) -> Vec<f32> {
    if outcomes.len() == 1 {
        return outcomes.pop().map(|(local, _)| local).unwrap_or_default();
    }
    let mut merged = snapshot.to_vec();
    for (local, _) in &outcomes {
        for ((acc, &after), &before) in merged.iter_mut().zip(local).zip(snapshot) {
            *acc += after - before;
        }
    }
    merged
}

#[allow(clippy::too_many_arguments)]
fn train_shard(
    params: &Hyperparameters,
    learning_rate: f32,
    interactions: &InteractionMatrix,
    features: &FeatureMatrix,
    first_user: usize,
    user_rows: &mut [f32],
    feature_embeddings: &mut [f32],
    rng: &mut StdRng,
) -> ShardStats {
    let dimensions = params.dimensions;
    let n_items = interactions.n_cols();
    let mut stats = ShardStats::default();

    let mut positives: Vec<(usize, u32, f32)> = Vec::new();
    for local_user in 0..user_rows.len() / dimensions {
        let user = first_user + local_user;
        let (items, weights) = interactions.row(user);
        if items.is_empty() {
            continue;
        }
        // Nothing left to sample as a negative
        if items.len() >= n_items {
            stats.skipped_users += 1;
            continue;
        }
        positives.extend(items.iter().zip(weights).map(|(&item, &weight)| (local_user, item, weight)));
    }
    positives.shuffle(rng);
    stats.positives = positives.len();

    let mut positive_vector = vec![0.0; dimensions];
    let mut negative_vector = vec![0.0; dimensions];
    let mut user_before = vec![0.0; dimensions];

    for (local_user, positive, weight) in positives {
        let user_items = interactions.row(first_user + local_user).0;
        let user_vector = &mut user_rows[local_user * dimensions..(local_user + 1) * dimensions];

        positive_vector.fill(0.0);
        accumulate_item(feature_embeddings, dimensions, features.row(positive as usize), &mut positive_vector);
        let positive_score = dot(user_vector, &positive_vector);

        for trial in 1..=params.negative_samples {
            let negative = sample_negative(rng, user_items, n_items);
            negative_vector.fill(0.0);
            accumulate_item(feature_embeddings, dimensions, features.row(negative as usize), &mut negative_vector);
            let negative_score = dot(user_vector, &negative_vector);

            if negative_score <= positive_score - params.margin {
                continue;
            }

            let rank_estimate = ((n_items - 1) / trial).max(1) as f32;
            let step = learning_rate * weight * rank_estimate.ln();
            if step > 0.0 {
                user_before.copy_from_slice(user_vector);
                for ((u, p), n) in user_vector.iter_mut().zip(&positive_vector).zip(&negative_vector) {
                    *u += step * (p - n);
                }
                for &feature in features.row(positive as usize) {
                    let embedding = row_mut(feature_embeddings, dimensions, feature as usize);
                    for (e, &u) in embedding.iter_mut().zip(&user_before) {
                        *e += step * u;
                    }
                }
                for &feature in features.row(negative as usize) {
                    let embedding = row_mut(feature_embeddings, dimensions, feature as usize);
                    for (e, &u) in embedding.iter_mut().zip(&user_before) {
                        *e -= step * u;
                    }
                }
                if params.regularization > 0.0 {
                    let shrink = 1.0 - learning_rate * params.regularization;
                    user_vector.iter_mut().for_each(|v| *v *= shrink);
                    for &feature in features.row(positive as usize).iter().chain(features.row(negative as usize)) {
                        row_mut(feature_embeddings, dimensions, feature as usize)
                            .iter_mut()
                            .for_each(|v| *v *= shrink);
                    }
                }
                stats.updates += 1;
            }
            break;
        }
    }

    debug!(
        first_user,
        positives = stats.positives,
        updates = stats.updates,
        "Shard finished"
    );
    stats
}

/// Uniform draw from `[0, n_items)` minus the sorted `positives`
fn sample_negative(rng: &mut StdRng, positives: &[u32], n_items: usize) -> u32 {
    let mut candidate = rng.random_range(0..(n_items - positives.len()) as u32);
    for &positive in positives {
        if positive <= candidate {
            candidate += 1;
        } else {
            break;
        }
    }
    candidate
}

fn accumulate_item(feature_embeddings: &[f32], dimensions: usize, item_features: &[u32], out: &mut [f32]) {
    for &feature in item_features {
        for (acc, value) in out.iter_mut().zip(row(feature_embeddings, dimensions, feature as usize)) {
            *acc += value;
        }
    }
}

fn row(data: &[f32], dimensions: usize, index: usize) -> &[f32] {
    &data[index * dimensions..(index + 1) * dimensions]
}

fn row_mut(data: &mut [f32], dimensions: usize, index: usize) -> &mut [f32] {
    &mut data[index * dimensions..(index + 1) * dimensions]
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RatingPolicy, WeightPolicy};
    use crate::features::build_feature_matrix;
    use crate::interactions::{build_interaction_matrix, item_mapping, user_mapping};
    use data_loader::{Interaction, MovieId};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    fn fixture(interactions: &[Interaction]) -> (InteractionMatrix, FeatureMatrix) {
        let tags: HashMap<MovieId, Vec<String>> = HashMap::new();
        let users = user_mapping(interactions);
        let items = item_mapping(0..6, interactions);
        let policy = WeightPolicy::default().with_ratings(RatingPolicy::Binary);
        let (matrix, _) = build_interaction_matrix(interactions, &users, &items, &policy);
        let (features, _) = build_feature_matrix(&tags, &items);
        (matrix, features)
    }

    fn blocks() -> Vec<Interaction> {
        // Users 0..4 like items 0..3, users 4..8 like items 3..6
        let mut interactions = Vec::new();
        for user in 0..8u32 {
            let items = if user < 4 { 0..3 } else { 3..6 };
            for item in items {
                interactions.push(Interaction::rating(user, item, 5.0, 0));
            }
        }
        interactions
    }

    #[test]
    fn test_sample_negative_skips_positives() {
        let mut rng = StdRng::seed_from_u64(3);
        let positives = [0, 2, 3, 7];
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            let negative = sample_negative(&mut rng, &positives, 8);
            assert!(negative < 8);
            assert!(!positives.contains(&negative));
            seen.insert(negative);
        }
        assert_eq!(seen, HashSet::from([1, 4, 5, 6]));
    }

    #[test]
    fn test_initialization_scale() {
        let mut rng = StdRng::seed_from_u64(1);
        let values = initial_embeddings(&mut rng, 10, 8);
        assert_eq!(values.len(), 80);
        assert!(values.iter().all(|v| v.abs() <= INIT_SCALE / 2.0));
        assert!(values.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_shard_seeds_differ_across_shards_and_passes() {
        let mut rng = StdRng::seed_from_u64(9);
        let first = shard_seeds(&mut rng, 4);
        let second = shard_seeds(&mut rng, 4);

        let distinct: HashSet<u64> = first.iter().chain(&second).copied().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(shard_seeds(&mut StdRng::seed_from_u64(9), 4), first);
    }

    #[test]
    fn test_fit_learns_block_structure() {
        let (matrix, features) = fixture(&blocks());
        let params = Hyperparameters::default()
            .with_dimensions(8)
            .with_epochs(30)
            .with_negative_samples(5);

        let model = HybridTrainer::new(params, 42).unwrap().fit(&matrix, &features).unwrap();

        assert_eq!(model.n_users(), 8);
        assert_eq!(model.n_features(), 6);
        assert_eq!(model.passes(), 30);
        // Same-block items outscore other-block items for each user
        for user in 0..8 {
            let liked = if user < 4 { 0 } else { 3 };
            let other = if user < 4 { 4 } else { 1 };
            assert!(model.score(&features, user, liked) > model.score(&features, user, other));
        }
    }

    #[test]
    fn test_fit_is_deterministic_per_seed_and_shards() {
        let (matrix, features) = fixture(&blocks());
        let params = Hyperparameters::default()
            .with_dimensions(4)
            .with_epochs(3)
            .with_parallelism(3);

        let first = HybridTrainer::new(params.clone(), 9).unwrap().fit(&matrix, &features).unwrap();
        let second = HybridTrainer::new(params.clone(), 9).unwrap().fit(&matrix, &features).unwrap();
        let other_seed = HybridTrainer::new(params, 10).unwrap().fit(&matrix, &features).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other_seed);
    }

    #[test]
    fn test_saturated_user_is_skipped() {
        // User 0 has interacted with every item; user 1 has not
        let mut interactions: Vec<Interaction> = (0..6).map(|item| Interaction::rating(0, item, 5.0, 0)).collect();
        interactions.push(Interaction::rating(1, 0, 5.0, 0));
        let (matrix, features) = fixture(&interactions);
        let params = Hyperparameters::default().with_dimensions(4).with_epochs(2);

        let model = HybridTrainer::new(params, 5).unwrap().fit(&matrix, &features).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let initial = initial_embeddings(&mut rng, 2, 4);
        assert_eq!(model.user_vector(0), &initial[..4]);
        assert!(model.user_vector(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fit_rejects_empty_matrix() {
        let (matrix, features) = fixture(&[]);
        let trainer = HybridTrainer::new(Hyperparameters::default(), 1).unwrap();
        assert!(matches!(
            trainer.fit(&matrix, &features),
            Err(TrainingError::NoTrainingSignal(_))
        ));
    }

    #[test]
    fn test_fit_rejects_mismatched_shapes() {
        let (matrix, _) = fixture(&blocks());
        let (_, features) = fixture(&[Interaction::rating(0, 9, 5.0, 0)]);
        let trainer = HybridTrainer::new(Hyperparameters::default(), 1).unwrap();
        assert!(matches!(
            trainer.fit(&matrix, &features),
            Err(TrainingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_deadline_exceeded() {
        let (matrix, features) = fixture(&blocks());
        let params = Hyperparameters::default()
            .with_dimensions(4)
            .with_epochs(1_000_000)
            .with_max_duration(Duration::from_millis(20));

        let result = HybridTrainer::new(params, 1).unwrap().fit(&matrix, &features);
        assert!(matches!(
            result,
            Err(TrainingError::DeadlineExceeded { passes, .. }) if passes == 1_000_000
        ));
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        let params = Hyperparameters::default().with_learning_rate(0.0);
        assert!(HybridTrainer::new(params, 1).is_err());
    }
}
