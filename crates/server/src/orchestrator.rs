//! # Recommendation Orchestrator
//!
//! Serves the three read operations over the currently published embedding
//! generation:
//! 1. `recommend`: nearest items to the user's vector, excluding items the
//!    user already interacted with; users without a vector get the
//!    popularity fallback
//! 2. `similar`: nearest items to an item's vector, excluding the item
//! 3. `trending`: the popularity provider's ranking for a window
//!
//! Results of all three share one shape and one tie-break (ascending movie
//! id). The popularity and metadata providers are external and may be slow
//! or down: each call runs on the blocking pool under a timeout. Popularity
//! falls back to the last ranking seen for the same window; metadata is
//! simply omitted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use data_loader::{DataIndex, MovieId, UserId};
use embedding_store::{EmbeddingStore, Generation, GenerationId, Neighbor};
use pipeline::{TrainingPipeline, TrainingReport};
use sources::{ItemMetadata, MetadataProvider, PopularityProvider, PopularityStats, TrendingWindow};

use crate::config::EngineConfig;
use crate::error::{Result, ServingError};

/// Where a served item's score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Similarity to the user's trained vector
    Personalized,
    /// Similarity to a vector folded in from the user's history
    FoldIn,
    /// Similarity to another item
    Similar,
    /// Popularity ranking (trending, or the cold-start fallback)
    Popularity,
}

/// One served item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRecommendation {
    pub movie_id: MovieId,
    /// Similarity score, or the interaction count for popularity results
    pub score: f32,
    pub source: RecommendationSource,
    pub metadata: Option<ItemMetadata>,
}

impl MovieRecommendation {
    fn new(movie_id: MovieId, score: f32, source: RecommendationSource) -> Self {
        Self {
            movie_id,
            score,
            source,
            metadata: None,
        }
    }
}

/// Coordinates the embedding store, the catalog and the external providers
#[derive(Clone)]
pub struct RecommendationOrchestrator {
    data_index: Arc<DataIndex>,
    store: Arc<EmbeddingStore>,
    popularity: Arc<dyn PopularityProvider>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    config: EngineConfig,
    /// Last successful popularity ranking per window
    last_popularity: Arc<Mutex<HashMap<TrendingWindow, Arc<Vec<PopularityStats>>>>>,
}

impl RecommendationOrchestrator {
    pub fn new(
        data_index: Arc<DataIndex>,
        store: Arc<EmbeddingStore>,
        popularity: Arc<dyn PopularityProvider>,
    ) -> Self {
        Self {
            data_index,
            store,
            popularity,
            metadata: None,
            config: EngineConfig::default(),
            last_popularity: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Decorate results with metadata from `provider`
    pub fn with_metadata(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data_index(&self) -> &Arc<DataIndex> {
        &self.data_index
    }

    /// Id of the generation currently served
    pub fn generation_id(&self) -> Option<GenerationId> {
        self.store.current_id()
    }

    /// Swap in a new generation for all subsequent requests
    pub fn publish(&self, generation: Generation) -> GenerationId {
        self.store.publish(generation)
    }

    /// Retrain on the catalog's full interaction log and publish the result.
    ///
    /// Training runs on the blocking pool; requests keep being served from
    /// the previous generation until the swap.
    #[instrument(skip_all, fields(seed = seed))]
    pub async fn train_and_publish(
        &self,
        pipeline: TrainingPipeline,
        seed: u64,
    ) -> Result<(GenerationId, TrainingReport)> {
        let data_index = Arc::clone(&self.data_index);
        let run = task::spawn_blocking(move || {
            pipeline.run(&data_index.all_interactions(), &data_index.item_tags(), seed)
        })
        .await
        .map_err(|e| ServingError::Internal(format!("training task failed: {e}")))??;

        let id = self.publish(run.generation);
        info!(generation = %id, "Published retrained generation");
        Ok((id, run.report))
    }

    /// Top `n` items for a user.
    ///
    /// Users with a stored vector are ranked against every item they have
    /// not interacted with. Everyone else, including ids never seen before,
    /// gets the popularity ranking for the default window minus the items
    /// they already interacted with. If popularity is unavailable and nothing
    /// is cached, the fallback is empty.
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<MovieRecommendation>> {
        let start_time = Instant::now();
        if n == 0 {
            return Ok(Vec::new());
        }

        let seen = self.data_index.interacted_movies(user_id);
        let personalized = match self.store.current() {
            Some(generation) => self.personalized(&generation, user_id, &seen, n)?,
            None => None,
        };

        let recommendations = match personalized {
            Some(recommendations) => recommendations,
            None => {
                debug!(user_id, "No user vector, serving popularity fallback");
                match self.ranked_popularity(self.config.default_window).await {
                    Ok(ranked) => popularity_recommendations(&ranked, &seen, n),
                    Err(e) => {
                        warn!(user_id, error = %e, "Popularity fallback unavailable");
                        Vec::new()
                    }
                }
            }
        };

        let recommendations = self.enrich(recommendations).await;
        info!(
            user_id,
            returned = recommendations.len(),
            elapsed_us = start_time.elapsed().as_micros() as u64,
            "Served recommendations"
        );
        Ok(recommendations)
    }

    /// Top `n` items most similar to `movie_id`, never including it.
    ///
    /// An item without a stored vector is `NotFound`, which is distinct from
    /// an item that simply has no neighbours (an empty list).
    #[instrument(skip(self))]
    pub async fn similar(&self, movie_id: MovieId, n: usize) -> Result<Vec<MovieRecommendation>> {
        let generation = self
            .store
            .current()
            .ok_or_else(|| ServingError::Unavailable("no embedding generation published".to_string()))?;
        let vector = generation.items().get(movie_id).ok_or(ServingError::NotFound {
            entity: "movie",
            id: movie_id,
        })?;

        let exclude: HashSet<MovieId> = [movie_id].into_iter().collect();
        let neighbors = generation
            .items()
            .nearest(vector, n, &exclude, self.config.similar_metric)?;

        let recommendations = neighbor_recommendations(neighbors, RecommendationSource::Similar);
        Ok(self.enrich(recommendations).await)
    }

    /// Top `n` items by interaction count in the trailing `window`.
    ///
    /// Fails with `Unavailable` only when the provider cannot answer and no
    /// earlier ranking for the same window is cached.
    #[instrument(skip(self), fields(window = %window))]
    pub async fn trending(&self, window: TrendingWindow, n: usize) -> Result<Vec<MovieRecommendation>> {
        if window.days == 0 {
            return Err(ServingError::InvalidRequest("trending window must span at least one day".to_string()));
        }
        let ranked = self.ranked_popularity(window).await?;
        let recommendations = popularity_recommendations(&ranked, &HashSet::new(), n);
        Ok(self.enrich(recommendations).await)
    }

    /// Personalized ranking, or `None` when the user has no usable vector
    fn personalized(
        &self,
        generation: &Generation,
        user_id: UserId,
        seen: &HashSet<MovieId>,
        n: usize,
    ) -> Result<Option<Vec<MovieRecommendation>>> {
        let metric = self.config.recommend_metric;

        if let Some(vector) = generation.users().get(user_id) {
            let neighbors = generation.items().nearest(vector, n, seen, metric)?;
            return Ok(Some(neighbor_recommendations(neighbors, RecommendationSource::Personalized)));
        }

        if self.config.fold_in
            && let Some(vector) = fold_in(generation, seen)
        {
            debug!(user_id, history = seen.len(), "Folded in user vector");
            let neighbors = generation.items().nearest(&vector, n, seen, metric)?;
            return Ok(Some(neighbor_recommendations(neighbors, RecommendationSource::FoldIn)));
        }

        Ok(None)
    }

    /// Popularity for `window` in ranking order, from the provider or the
    /// last-known cache
    async fn ranked_popularity(&self, window: TrendingWindow) -> Result<Arc<Vec<PopularityStats>>> {
        let provider = Arc::clone(&self.popularity);
        let call = task::spawn_blocking(move || provider.popularity(window));

        let failure = match timeout(self.config.provider_timeout, call).await {
            Ok(Ok(Ok(mut stats))) => {
                stats.sort_by(PopularityStats::ranking);
                let stats = Arc::new(stats);
                self.last_popularity.lock().insert(window, Arc::clone(&stats));
                return Ok(stats);
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(e)) => format!("popularity task failed: {e}"),
            Err(_) => format!("popularity provider timed out after {:?}", self.config.provider_timeout),
        };

        match self.last_popularity.lock().get(&window) {
            Some(cached) => {
                warn!(window = %window, reason = %failure, "Serving last known popularity");
                Ok(Arc::clone(cached))
            }
            None => Err(ServingError::Unavailable(failure)),
        }
    }

    /// Attach metadata without touching order; failures only cost the decoration
    async fn enrich(&self, mut recommendations: Vec<MovieRecommendation>) -> Vec<MovieRecommendation> {
        let Some(provider) = self.metadata.clone() else {
            return recommendations;
        };
        if recommendations.is_empty() {
            return recommendations;
        }

        let ids: Vec<MovieId> = recommendations.iter().map(|r| r.movie_id).collect();
        let call = task::spawn_blocking(move || provider.metadata(&ids));

        match timeout(self.config.provider_timeout, call).await {
            Ok(Ok(Ok(mut metadata))) => {
                for recommendation in &mut recommendations {
                    recommendation.metadata = metadata.remove(&recommendation.movie_id);
                }
            }
            Ok(Ok(Err(e))) => warn!(error = %e, "Metadata provider failed, serving without metadata"),
            Ok(Err(e)) => warn!(error = %e, "Metadata task failed, serving without metadata"),
            Err(_) => warn!(
                timeout_ms = self.config.provider_timeout.as_millis() as u64,
                "Metadata provider timed out, serving without metadata"
            ),
        }
        recommendations
    }
}

/// Mean of the item vectors of a user's history, if any are embedded
fn fold_in(generation: &Generation, seen: &HashSet<MovieId>) -> Option<Vec<f32>> {
    let mut vector = vec![0.0; generation.dimensions()];
    let mut count = 0usize;
    for &movie_id in seen {
        if let Some(item) = generation.items().get(movie_id) {
            for (acc, value) in vector.iter_mut().zip(item) {
                *acc += value;
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    vector.iter_mut().for_each(|v| *v /= count as f32);
    Some(vector)
}

fn neighbor_recommendations(neighbors: Vec<Neighbor>, source: RecommendationSource) -> Vec<MovieRecommendation> {
    neighbors
        .into_iter()
        .map(|neighbor| MovieRecommendation::new(neighbor.id, neighbor.score, source))
        .collect()
}

fn popularity_recommendations(
    ranked: &[PopularityStats],
    exclude: &HashSet<MovieId>,
    n: usize,
) -> Vec<MovieRecommendation> {
    ranked
        .iter()
        .filter(|stats| !exclude.contains(&stats.movie_id))
        .take(n)
        .map(|stats| MovieRecommendation::new(stats.movie_id, stats.count as f32, RecommendationSource::Popularity))
        .collect()
}
