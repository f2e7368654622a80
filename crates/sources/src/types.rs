//! Shapes exchanged with the popularity and metadata collaborators.

use data_loader::{Movie, MovieId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

/// Trailing window for popularity aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrendingWindow {
    pub days: u32,
}

impl TrendingWindow {
    pub const DEFAULT_DAYS: u32 = 7;

    pub fn days(days: u32) -> Self {
        Self { days }
    }

    /// Earliest timestamp inside the window ending at `anchor`
    pub fn start(&self, anchor: Timestamp) -> Timestamp {
        anchor.saturating_sub(self.days as i64 * SECONDS_PER_DAY)
    }
}

impl Default for TrendingWindow {
    fn default() -> Self {
        Self::days(Self::DEFAULT_DAYS)
    }
}

impl fmt::Display for TrendingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days)
    }
}

/// Interaction count and mean rating of one item inside a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularityStats {
    pub movie_id: MovieId,
    pub count: u32,
    /// Mean explicit rating; `None` when the window holds only implicit feedback
    pub mean_rating: Option<f32>,
}

impl PopularityStats {
    /// Popularity order: count descending, then movie id ascending
    pub fn ranking(a: &PopularityStats, b: &PopularityStats) -> Ordering {
        b.count.cmp(&a.count).then(a.movie_id.cmp(&b.movie_id))
    }
}

/// Decoration attached to served items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub movie_id: MovieId,
    pub title: String,
    pub year: Option<u16>,
    pub tags: Vec<String>,
    pub overview: Option<String>,
    pub image: Option<String>,
}

impl From<&Movie> for ItemMetadata {
    fn from(movie: &Movie) -> Self {
        Self {
            movie_id: movie.id,
            title: movie.title.clone(),
            year: movie.year,
            tags: movie.genres.clone(),
            overview: movie.overview.clone(),
            image: movie.poster_path.clone(),
        }
    }
}
