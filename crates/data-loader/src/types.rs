//! Core domain types for the movie catalog and its interaction log.
//!
//! This module defines the fundamental data structures used throughout the system:
//! users, movies with free-form category tags, interactions (explicit ratings or
//! implicit signals), and the in-memory `DataIndex` that owns them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::DataLoadError;

// =============================================================================
// Type Aliases
// =============================================================================
// These make the domain clearer and prevent mixing up user IDs with movie IDs

/// Externally issued identifier for a user
pub type UserId = u32;

/// Externally issued identifier for a movie
pub type MovieId = u32;

/// Seconds since the Unix epoch
pub type Timestamp = i64;

/// Lowest value accepted for an explicit rating
pub const RATING_MIN: f32 = 0.5;

/// Highest value accepted for an explicit rating
pub const RATING_MAX: f32 = 5.0;

/// Training weight of an implicit interaction that carries no explicit weight
pub const DEFAULT_IMPLICIT_WEIGHT: f32 = 1.0;

// =============================================================================
// User and Movie
// =============================================================================

/// A user of the catalog. Only the identifier is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
}

/// Represents a movie in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    /// Category tags. Order carries no meaning; `DataIndex::insert_movie`
    /// sorts and deduplicates them.
    pub genres: Vec<String>,
    /// Free-text synopsis supplied by metadata enrichment
    pub overview: Option<String>,
    /// Image reference supplied by metadata enrichment
    pub poster_path: Option<String>,
}

impl Movie {
    /// Create a movie without enrichment metadata
    pub fn new<I, S>(id: MovieId, title: impl Into<String>, year: Option<u16>, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            title: title.into(),
            year,
            genres: genres.into_iter().map(Into::into).collect(),
            overview: None,
            poster_path: None,
        }
    }

    /// Attach enrichment metadata
    pub fn with_metadata(mut self, overview: Option<String>, poster_path: Option<String>) -> Self {
        self.overview = overview;
        self.poster_path = poster_path;
        self
    }
}

// =============================================================================
// Interactions
// =============================================================================

/// How the user expressed interest in a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackKind {
    /// Explicit rating on the bounded scale
    Rating,
    /// The user watched or opened the movie
    View,
    /// The user marked the movie as liked
    Like,
}

impl FeedbackKind {
    pub fn is_implicit(self) -> bool {
        !matches!(self, FeedbackKind::Rating)
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedbackKind::Rating => "rating",
            FeedbackKind::View => "view",
            FeedbackKind::Like => "like",
        };
        f.write_str(name)
    }
}

impl FromStr for FeedbackKind {
    type Err = DataLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rating" | "rated" => Ok(FeedbackKind::Rating),
            "view" | "viewed" | "watch" | "watched" => Ok(FeedbackKind::View),
            "like" | "liked" => Ok(FeedbackKind::Like),
            _ => Err(DataLoadError::InvalidValue {
                field: "interaction_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A single (user, movie) interaction.
///
/// At most one interaction exists per pair; recording a new one for the same
/// pair replaces rating, weight, kind and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub kind: FeedbackKind,
    /// Explicit rating, when the feedback carried one
    pub rating: Option<f32>,
    /// Explicit weight; wins over any weight derived from the kind or rating
    pub weight: Option<f32>,
    pub timestamp: Timestamp,
}

impl Interaction {
    /// An explicit rating
    pub fn rating(user_id: UserId, movie_id: MovieId, rating: f32, timestamp: Timestamp) -> Self {
        Self {
            user_id,
            movie_id,
            kind: FeedbackKind::Rating,
            rating: Some(rating),
            weight: None,
            timestamp,
        }
    }

    /// An implicit signal such as a view or a like
    pub fn implicit(
        user_id: UserId,
        movie_id: MovieId,
        kind: FeedbackKind,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            user_id,
            movie_id,
            kind,
            rating: None,
            weight: None,
            timestamp,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Aggregate statistics for a movie over some set of interactions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    /// Mean of the explicit ratings, 0.0 when none were given
    pub avg_rating: f32,
    /// Number of interactions (rated or implicit)
    pub rating_count: u32,
    /// Popularity score derived from rating count and average
    pub popularity_score: f32,
}

// =============================================================================
// DataIndex - The Core In-Memory Catalog
// =============================================================================

/// Main data structure that holds the catalog, the interaction log and indices.
///
/// Interactions are keyed per user by movie id, so the per-pair uniqueness
/// invariant is structural and per-user iteration is in ascending movie id.
#[derive(Debug)]
pub struct DataIndex {
    // Primary data stores
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// All interactions made by each user, keyed by movie
    pub(crate) user_interactions: HashMap<UserId, BTreeMap<MovieId, Interaction>>,

    /// Movies grouped by tag (one movie can appear in multiple tag lists)
    pub(crate) tag_index: HashMap<String, Vec<MovieId>>,

    // Precomputed all-time statistics
    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            movies: HashMap::new(),
            user_interactions: HashMap::new(),
            tag_index: HashMap::new(),
            movie_stats: HashMap::new(),
        }
    }

    /// Get a user by ID
    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Get the interaction a user recorded for a movie, if any
    pub fn get_interaction(&self, user_id: UserId, movie_id: MovieId) -> Option<&Interaction> {
        self.user_interactions.get(&user_id)?.get(&movie_id)
    }

    /// All interactions of a user in ascending movie id order
    pub fn get_user_interactions(&self, user_id: UserId) -> Vec<&Interaction> {
        self.user_interactions
            .get(&user_id)
            .map(|items| items.values().collect())
            .unwrap_or_default()
    }

    /// Set of movies the user has interacted with in any way
    pub fn interacted_movies(&self, user_id: UserId) -> HashSet<MovieId> {
        self.user_interactions
            .get(&user_id)
            .map(|items| items.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every interaction in the log, ordered by (user id, movie id)
    pub fn all_interactions(&self) -> Vec<Interaction> {
        let mut user_ids: Vec<UserId> = self.user_interactions.keys().copied().collect();
        user_ids.sort_unstable();
        user_ids
            .into_iter()
            .flat_map(|user_id| self.user_interactions[&user_id].values().copied())
            .collect()
    }

    /// Tag sets of every catalog movie, keyed by movie id
    pub fn item_tags(&self) -> HashMap<MovieId, Vec<String>> {
        self.movies
            .iter()
            .map(|(&id, movie)| (id, movie.genres.clone()))
            .collect()
    }

    /// All movie ids in ascending order
    pub fn get_all_movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All user ids in ascending order
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get all movies carrying a specific tag
    pub fn get_movies_by_tag(&self, tag: &str) -> &[MovieId] {
        self.tag_index
            .get(tag)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get precomputed all-time statistics for a movie
    pub fn get_movie_stats(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// Newest interaction timestamp in the log
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.user_interactions
            .values()
            .flat_map(|items| items.values())
            .map(|interaction| interaction.timestamp)
            .max()
    }

    // Mutators

    /// Insert a user into the index
    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Register a user id; returns false if it was already known
    pub fn register_user(&mut self, id: UserId) -> bool {
        if self.users.contains_key(&id) {
            return false;
        }
        self.users.insert(id, User { id });
        true
    }

    /// Insert a movie, normalising its tag set
    pub fn insert_movie(&mut self, mut movie: Movie) {
        movie.genres.sort();
        movie.genres.dedup();
        self.movies.insert(movie.id, movie);
    }

    /// Record an interaction, replacing any previous one for the same pair.
    ///
    /// The user is registered on first interaction. The record is stored as
    /// given: an implicit record without an explicit weight keeps `weight:
    /// None` so the training weight policy decides. Returns the interaction
    /// that was replaced, if any.
    pub fn record_interaction(&mut self, interaction: Interaction) -> Option<Interaction> {
        self.register_user(interaction.user_id);
        self.user_interactions
            .entry(interaction.user_id)
            .or_default()
            .insert(interaction.movie_id, interaction)
    }

    /// Remove a user's interaction with a movie (an "unlike")
    pub fn remove_interaction(&mut self, user_id: UserId, movie_id: MovieId) -> Option<Interaction> {
        let items = self.user_interactions.get_mut(&user_id)?;
        let removed = items.remove(&movie_id);
        if items.is_empty() {
            self.user_interactions.remove(&user_id);
        }
        removed
    }

    /// Get counts for debugging/validation: (users, movies, interactions)
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_interactions = self.user_interactions.values().map(|v| v.len()).sum();
        (self.users.len(), self.movies.len(), total_interactions)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_kind_parsing() {
        assert_eq!("liked".parse::<FeedbackKind>().unwrap(), FeedbackKind::Like);
        assert_eq!("View".parse::<FeedbackKind>().unwrap(), FeedbackKind::View);
        assert_eq!("rating".parse::<FeedbackKind>().unwrap(), FeedbackKind::Rating);
        assert!("shared".parse::<FeedbackKind>().is_err());
        assert!(FeedbackKind::Like.is_implicit());
        assert!(!FeedbackKind::Rating.is_implicit());
    }

    #[test]
    fn test_record_interaction_latest_write_wins() {
        let mut index = DataIndex::new();

        assert!(index.record_interaction(Interaction::rating(1, 10, 2.0, 100)).is_none());
        let previous = index.record_interaction(Interaction::rating(1, 10, 4.5, 200));

        assert_eq!(previous.unwrap().rating, Some(2.0));
        assert_eq!(index.get_user_interactions(1).len(), 1);
        let stored = index.get_interaction(1, 10).unwrap();
        assert_eq!(stored.rating, Some(4.5));
        assert_eq!(stored.timestamp, 200);
    }

    #[test]
    fn test_implicit_interaction_keeps_weight_unset() {
        let mut index = DataIndex::new();
        index.record_interaction(Interaction::implicit(7, 3, FeedbackKind::Like, 5));
        index.record_interaction(Interaction::implicit(7, 4, FeedbackKind::View, 6).with_weight(0.25));

        let stored = index.get_interaction(7, 3).unwrap();
        assert_eq!(stored.weight, None);
        assert_eq!(index.get_interaction(7, 4).unwrap().weight, Some(0.25));
        assert!(index.get_user(7).is_some(), "user is created on first interaction");
    }

    #[test]
    fn test_insert_movie_deduplicates_tags() {
        let mut index = DataIndex::new();
        index.insert_movie(Movie::new(1, "Heat (1995)", Some(1995), ["Thriller", "Action", "Thriller"]));

        assert_eq!(index.get_movie(1).unwrap().genres, vec!["Action", "Thriller"]);
    }

    #[test]
    fn test_all_interactions_is_ordered() {
        let mut index = DataIndex::new();
        index.record_interaction(Interaction::rating(2, 5, 3.0, 1));
        index.record_interaction(Interaction::rating(1, 9, 3.0, 1));
        index.record_interaction(Interaction::rating(1, 4, 3.0, 1));

        let pairs: Vec<(UserId, MovieId)> = index
            .all_interactions()
            .iter()
            .map(|i| (i.user_id, i.movie_id))
            .collect();
        assert_eq!(pairs, vec![(1, 4), (1, 9), (2, 5)]);
    }

    #[test]
    fn test_remove_interaction() {
        let mut index = DataIndex::new();
        index.record_interaction(Interaction::rating(1, 4, 3.0, 1));

        assert!(index.remove_interaction(1, 4).is_some());
        assert!(index.remove_interaction(1, 4).is_none());
        assert!(index.interacted_movies(1).is_empty());
    }
}
