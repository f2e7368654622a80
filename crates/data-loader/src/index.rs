//! DataIndex building, aggregation and validation.
//!
//! - Load the MovieLens files into a `DataIndex`
//! - Build the tag secondary index
//! - Compute all-time and windowed per-movie statistics

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument};

impl DataIndex {
    /// Load the MovieLens dataset from a directory
    ///
    /// Steps:
    /// 1. Parse movies.dat and ratings.dat (and users.dat when present) in parallel
    /// 2. Build primary indices
    /// 3. Build the tag index
    /// 4. Compute movie statistics
    /// 5. Validate data integrity
    #[instrument]
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        if !data_dir.is_dir() {
            return Err(DataLoadError::FileNotFound {
                path: data_dir.display().to_string(),
            });
        }

        let users_path = data_dir.join("users.dat");
        let movies_path = data_dir.join("movies.dat");
        let ratings_path = data_dir.join("ratings.dat");

        // Rayon's `join` runs two closures in parallel; nested for three-way parallelism
        let ((users, movies), ratings) = rayon::join(
            || {
                rayon::join(
                    || {
                        if users_path.exists() {
                            parser::parse_users(&users_path)
                        } else {
                            Ok(Vec::new())
                        }
                    },
                    || parser::parse_movies(&movies_path),
                )
            },
            || parser::parse_ratings(&ratings_path),
        );

        let users = users?;
        let movies = movies?;
        let ratings = ratings?;

        info!(
            users = users.len(),
            movies = movies.len(),
            ratings = ratings.len(),
            "Parsed MovieLens files"
        );

        let mut index = DataIndex::new();
        for user in users {
            index.insert_user(user);
        }
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ratings {
            index.record_interaction(rating);
        }

        index.build_secondary_indices();
        index.compute_movie_stats();
        index.validate()?;

        info!("DataIndex built and validated");
        Ok(index)
    }

    /// Rebuild the tag index from the current movies
    pub fn build_secondary_indices(&mut self) {
        self.tag_index.clear();
        for (movie_id, movie) in &self.movies {
            for tag in &movie.genres {
                self.tag_index
                    .entry(tag.clone())
                    .or_default()
                    .push(*movie_id);
            }
        }
        for ids in self.tag_index.values_mut() {
            ids.sort_unstable();
        }
    }

    /// Compute all-time statistics for every movie with at least one interaction
    pub fn compute_movie_stats(&mut self) {
        self.movie_stats = self.aggregate_stats(None, None);
    }

    /// Statistics over interactions with `timestamp >= since`
    ///
    /// This is the trailing-window popularity aggregate; the caller picks the
    /// window start.
    pub fn movie_stats_since(&self, since: Timestamp) -> HashMap<MovieId, MovieStats> {
        self.aggregate_stats(Some(since), None)
    }

    /// Statistics over interactions with `since <= timestamp <= until`
    pub fn movie_stats_between(&self, since: Timestamp, until: Timestamp) -> HashMap<MovieId, MovieStats> {
        self.aggregate_stats(Some(since), Some(until))
    }

    fn aggregate_stats(&self, since: Option<Timestamp>, until: Option<Timestamp>) -> HashMap<MovieId, MovieStats> {
        // (interaction count, rating sum, rated count) per movie
        let totals = self
            .user_interactions
            .par_iter()
            .fold(HashMap::new, |mut local: HashMap<MovieId, (u32, f32, u32)>, (_, items)| {
                for interaction in items.values() {
                    if since.is_some_and(|start| interaction.timestamp < start)
                        || until.is_some_and(|end| interaction.timestamp > end)
                    {
                        continue;
                    }
                    let entry = local.entry(interaction.movie_id).or_insert((0, 0.0, 0));
                    entry.0 += 1;
                    if let Some(rating) = interaction.rating {
                        entry.1 += rating;
                        entry.2 += 1;
                    }
                }
                local
            })
            .reduce(HashMap::new, |mut acc, local| {
                for (movie_id, (count, sum, rated)) in local {
                    let entry = acc.entry(movie_id).or_insert((0, 0.0, 0));
                    entry.0 += count;
                    entry.1 += sum;
                    entry.2 += rated;
                }
                acc
            });

        totals
            .into_iter()
            .map(|(movie_id, (count, sum, rated))| {
                let avg_rating = if rated > 0 { sum / rated as f32 } else { 0.0 };
                (
                    movie_id,
                    MovieStats {
                        avg_rating,
                        rating_count: count,
                        popularity_score: compute_popularity_score(avg_rating, count),
                    },
                )
            })
            .collect()
    }

    /// Validate data integrity
    ///
    /// Check that:
    /// - Every interaction references a catalog movie
    /// - Explicit ratings lie on the rating scale
    /// - Explicit weights are finite and positive
    pub fn validate(&self) -> Result<()> {
        for items in self.user_interactions.values() {
            for interaction in items.values() {
                if !self.movies.contains_key(&interaction.movie_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Movie".to_string(),
                        id: interaction.movie_id,
                    });
                }
                if let Some(rating) = interaction.rating
                    && !(RATING_MIN..=RATING_MAX).contains(&rating)
                {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: rating.to_string(),
                    });
                }
                if let Some(weight) = interaction.weight
                    && !(weight.is_finite() && weight > 0.0)
                {
                    return Err(DataLoadError::InvalidValue {
                        field: "weight".to_string(),
                        value: weight.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Popularity score: avg_rating * ln(count + 1)
///
/// Rewards both high ratings and many interactions.
fn compute_popularity_score(avg_rating: f32, count: u32) -> f32 {
    avg_rating * (count as f32 + 1.0).ln()
}
