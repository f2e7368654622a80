//! Offline evaluation: hold out part of each user's history, train on the
//! rest and measure Recall@K of the held-out items, next to a popularity
//! baseline scored on the same split.

use crate::error::{Result, TrainingError};
use crate::training::TrainingPipeline;
use data_loader::{Interaction, MovieId, UserId};
use embedding_store::{Generation, Metric};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument};

/// How each user's interactions are divided between train and test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// The `per_user` most recent interactions (ties by item id) are held out;
    /// users with no more than `per_user` interactions stay entirely in train
    LeaveLastOut { per_user: usize },
    /// Each interaction is held out with probability `fraction`; every user
    /// with two or more interactions keeps at least one on each side
    RandomFraction { fraction: f32 },
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::LeaveLastOut { per_user: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionSplit {
    pub train: Vec<Interaction>,
    pub test: Vec<Interaction>,
}

/// Split interactions per user.
///
/// Repeated (user, item) pairs are collapsed first, the last record winning,
/// so a pair never lands on both sides.
pub fn split_interactions(
    interactions: &[Interaction],
    strategy: SplitStrategy,
    seed: u64,
) -> Result<InteractionSplit> {
    match strategy {
        SplitStrategy::LeaveLastOut { per_user: 0 } => {
            return Err(TrainingError::InvalidInput("per_user must be at least 1".to_string()));
        }
        SplitStrategy::RandomFraction { fraction } if !(fraction > 0.0 && fraction < 1.0) => {
            return Err(TrainingError::InvalidInput(format!(
                "fraction must be in (0, 1), got {fraction}"
            )));
        }
        _ => {}
    }

    let mut by_user: BTreeMap<UserId, BTreeMap<MovieId, Interaction>> = BTreeMap::new();
    for interaction in interactions {
        by_user
            .entry(interaction.user_id)
            .or_default()
            .insert(interaction.movie_id, *interaction);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = InteractionSplit::default();

    for history in by_user.into_values() {
        let mut history: Vec<Interaction> = history.into_values().collect();
        match strategy {
            SplitStrategy::LeaveLastOut { per_user } => {
                if history.len() <= per_user {
                    split.train.extend(history);
                    continue;
                }
                history.sort_by_key(|i| (i.timestamp, i.movie_id));
                let test = history.split_off(history.len() - per_user);
                split.train.extend(history);
                split.test.extend(test);
            }
            SplitStrategy::RandomFraction { fraction } => {
                if history.len() < 2 {
                    split.train.extend(history);
                    continue;
                }
                let (mut test, mut train): (Vec<Interaction>, Vec<Interaction>) =
                    history.into_iter().partition(|_| rng.random::<f32>() < fraction);
                if test.is_empty() {
                    test.extend(train.pop());
                } else if train.is_empty() {
                    train.push(test.remove(0));
                }
                split.train.extend(train);
                split.test.extend(test);
            }
        }
    }

    Ok(split)
}

/// Recall@K of one ranking and its popularity baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub recall_at_k: f64,
    pub popularity_recall_at_k: f64,
    /// Users with at least one held-out item still in the catalog
    pub users_evaluated: usize,
    pub train_interactions: usize,
    pub test_interactions: usize,
}

/// Trains on a split and scores the result.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pipeline: TrainingPipeline,
    metric: Metric,
}

impl Evaluator {
    pub fn new(pipeline: TrainingPipeline) -> Self {
        Self {
            pipeline,
            metric: Metric::Dot,
        }
    }

    /// Metric used to rank items against a user vector
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Split, train on the train side, and measure Recall@K on the test side.
    ///
    /// Items seen only in the test side are still part of the catalog, so
    /// they receive embeddings and can be recommended.
    #[instrument(skip_all, fields(k = k, interactions = interactions.len()))]
    pub fn evaluate(
        &self,
        interactions: &[Interaction],
        item_tags: &HashMap<MovieId, Vec<String>>,
        k: usize,
        strategy: SplitStrategy,
        seed: u64,
    ) -> Result<EvaluationReport> {
        check_k(k)?;
        if interactions.is_empty() {
            return Err(TrainingError::NoTrainingSignal("no interactions to evaluate".to_string()));
        }

        let split = split_interactions(interactions, strategy, seed)?;
        let mut catalog = item_tags.clone();
        for interaction in interactions {
            catalog.entry(interaction.movie_id).or_default();
        }

        let run = self.pipeline.run(&split.train, &catalog, seed)?;
        evaluate_generation(&run.generation, &split, k, self.metric)
    }
}

/// Score an already trained generation against a split.
#[instrument(skip_all, fields(k = k, generation = %generation.id()))]
pub fn evaluate_generation(
    generation: &Generation,
    split: &InteractionSplit,
    k: usize,
    metric: Metric,
) -> Result<EvaluationReport> {
    check_k(k)?;

    let mut seen: HashMap<UserId, HashSet<MovieId>> = HashMap::new();
    let mut counts: HashMap<MovieId, usize> = HashMap::new();
    for interaction in &split.train {
        seen.entry(interaction.user_id).or_default().insert(interaction.movie_id);
        *counts.entry(interaction.movie_id).or_default() += 1;
    }

    let mut held_out: BTreeMap<UserId, HashSet<MovieId>> = BTreeMap::new();
    for interaction in &split.test {
        if generation.items().contains(interaction.movie_id) {
            held_out.entry(interaction.user_id).or_default().insert(interaction.movie_id);
        }
    }

    // Catalog items by train count descending, then id ascending
    let mut popular: Vec<(MovieId, usize)> = generation
        .items()
        .ids()
        .iter()
        .map(|&id| (id, counts.get(&id).copied().unwrap_or(0)))
        .collect();
    popular.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let empty = HashSet::new();
    let per_user: Vec<(f64, f64)> = held_out
        .par_iter()
        .map(|(user, relevant)| -> Result<(f64, f64)> {
            let exclude = seen.get(user).unwrap_or(&empty);
            let baseline = top_popular(&popular, exclude, k);
            let personalized: Vec<MovieId> = match generation.users().get(*user) {
                Some(vector) => generation
                    .items()
                    .nearest(vector, k, exclude, metric)?
                    .into_iter()
                    .map(|neighbor| neighbor.id)
                    .collect(),
                None => baseline.clone(),
            };
            Ok((recall(&personalized, relevant), recall(&baseline, relevant)))
        })
        .collect::<Result<_>>()?;

    let users_evaluated = per_user.len();
    let (recall_sum, baseline_sum) = per_user
        .iter()
        .fold((0.0, 0.0), |(r, b), (user_r, user_b)| (r + user_r, b + user_b));
    let mean = |sum: f64| if users_evaluated == 0 { 0.0 } else { sum / users_evaluated as f64 };

    let report = EvaluationReport {
        k,
        recall_at_k: mean(recall_sum),
        popularity_recall_at_k: mean(baseline_sum),
        users_evaluated,
        train_interactions: split.train.len(),
        test_interactions: split.test.len(),
    };

    info!(
        k,
        recall = report.recall_at_k,
        popularity_recall = report.popularity_recall_at_k,
        users = users_evaluated,
        "Evaluation complete"
    );
    Ok(report)
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(TrainingError::InvalidInput("k must be at least 1".to_string()));
    }
    Ok(())
}

fn top_popular(popular: &[(MovieId, usize)], exclude: &HashSet<MovieId>, k: usize) -> Vec<MovieId> {
    popular
        .iter()
        .map(|&(id, _)| id)
        .filter(|id| !exclude.contains(id))
        .take(k)
        .collect()
}

fn recall(ranked: &[MovieId], relevant: &HashSet<MovieId>) -> f64 {
    let hits = ranked.iter().filter(|id| relevant.contains(id)).count();
    hits as f64 / relevant.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hyperparameters;
    use embedding_store::{EmbeddingTable, TagVocabulary};

    fn history() -> Vec<Interaction> {
        let mut interactions = Vec::new();
        for user in 1..=6u32 {
            for item in 1..=5u32 {
                interactions.push(Interaction::rating(user, item + (user % 2) * 5, 4.0, (item * 10) as i64));
            }
        }
        interactions
    }

    #[test]
    fn test_leave_last_out_takes_latest() {
        let interactions = vec![
            Interaction::rating(1, 10, 4.0, 300),
            Interaction::rating(1, 20, 4.0, 100),
            Interaction::rating(1, 30, 4.0, 300),
            Interaction::rating(2, 10, 4.0, 100),
        ];

        let split = split_interactions(&interactions, SplitStrategy::LeaveLastOut { per_user: 1 }, 0).unwrap();

        // Tie at t=300 goes to the higher item id; user 2 has too few to split
        assert_eq!(split.test.len(), 1);
        assert_eq!((split.test[0].user_id, split.test[0].movie_id), (1, 30));
        assert_eq!(split.train.len(), 3);
    }

    #[test]
    fn test_random_fraction_keeps_both_sides() {
        let split = split_interactions(&history(), SplitStrategy::RandomFraction { fraction: 0.2 }, 5).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 30);
        for user in 1..=6 {
            assert!(split.train.iter().any(|i| i.user_id == user));
            assert!(split.test.iter().any(|i| i.user_id == user));
        }
        let again = split_interactions(&history(), SplitStrategy::RandomFraction { fraction: 0.2 }, 5).unwrap();
        assert_eq!(split, again);
    }

    #[test]
    fn test_split_rejects_bad_strategy() {
        assert!(split_interactions(&history(), SplitStrategy::LeaveLastOut { per_user: 0 }, 0).is_err());
        assert!(split_interactions(&history(), SplitStrategy::RandomFraction { fraction: 1.0 }, 0).is_err());
        assert!(split_interactions(&history(), SplitStrategy::RandomFraction { fraction: f32::NAN }, 0).is_err());
    }

    #[test]
    fn test_recall_is_one_when_k_covers_catalog() {
        let evaluator = Evaluator::new(TrainingPipeline::new(
            Hyperparameters::default().with_dimensions(4).with_epochs(2),
        ));

        let report = evaluator
            .evaluate(&history(), &HashMap::new(), 100, SplitStrategy::default(), 1)
            .unwrap();

        assert_eq!(report.users_evaluated, 6);
        assert_eq!(report.recall_at_k, 1.0);
        assert_eq!(report.popularity_recall_at_k, 1.0);
    }

    #[test]
    fn test_recall_stays_in_unit_range() {
        let evaluator = Evaluator::new(TrainingPipeline::new(
            Hyperparameters::default().with_dimensions(4).with_epochs(2),
        ));

        let report = evaluator
            .evaluate(&history(), &HashMap::new(), 1, SplitStrategy::default(), 1)
            .unwrap();

        assert!((0.0..=1.0).contains(&report.recall_at_k));
        assert!((0.0..=1.0).contains(&report.popularity_recall_at_k));
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let evaluator = Evaluator::new(TrainingPipeline::default());
        assert!(matches!(
            evaluator.evaluate(&history(), &HashMap::new(), 0, SplitStrategy::default(), 1),
            Err(TrainingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_hand_built_generation() {
        let mut users = EmbeddingTable::new(2).unwrap();
        users.upsert(1, &[1.0, 0.0]).unwrap();
        let mut items = EmbeddingTable::new(2).unwrap();
        items.upsert(10, &[1.0, 0.0]).unwrap();
        items.upsert(20, &[0.9, 0.1]).unwrap();
        items.upsert(30, &[0.0, 1.0]).unwrap();
        let tags = EmbeddingTable::new(2).unwrap();
        let generation = Generation::new(2, users, items, tags, TagVocabulary::new(3, Vec::new())).unwrap();

        let split = InteractionSplit {
            train: vec![Interaction::rating(1, 10, 5.0, 0), Interaction::rating(2, 30, 5.0, 0)],
            test: vec![Interaction::rating(1, 20, 5.0, 1), Interaction::rating(1, 99, 5.0, 1)],
        };

        let report = evaluate_generation(&generation, &split, 1, Metric::Dot).unwrap();

        // Item 99 is not in the catalog; user 1 must find 20 once 10 is excluded
        assert_eq!(report.users_evaluated, 1);
        assert_eq!(report.recall_at_k, 1.0);
        // Popularity ranks 30 (one train interaction) ahead of 20
        assert_eq!(report.popularity_recall_at_k, 0.0);
    }
}
