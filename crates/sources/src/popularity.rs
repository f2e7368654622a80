//! Popularity aggregates.
//!
//! A [`PopularityProvider`] answers "which items were interacted with most
//! in the trailing window". The serving layer treats it as an external,
//! possibly slow or failing collaborator.

use crate::error::{Result, SourceError};
use crate::types::{PopularityStats, TrendingWindow};
use data_loader::{DataIndex, Timestamp};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Source of per-item popularity over a trailing window.
///
/// Implementations return every item with at least one interaction in the
/// window; ordering is not relied upon by callers.
pub trait PopularityProvider: Send + Sync {
    fn popularity(&self, window: TrendingWindow) -> Result<Vec<PopularityStats>>;
}

/// Popularity computed from the in-memory interaction log.
///
/// The window ends at the anchor timestamp, which defaults to the newest
/// interaction in the log so that historical datasets still have a
/// non-empty "recent" period.
pub struct CatalogPopularity {
    data_index: Arc<DataIndex>,
    anchor: Option<Timestamp>,
}

impl CatalogPopularity {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self {
            data_index,
            anchor: None,
        }
    }

    /// Fix the end of every window (e.g. "now" for a live log)
    pub fn with_anchor(mut self, anchor: Timestamp) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl PopularityProvider for CatalogPopularity {
    #[instrument(skip_all, fields(window = %window))]
    fn popularity(&self, window: TrendingWindow) -> Result<Vec<PopularityStats>> {
        if window.days == 0 {
            return Err(SourceError::invalid_request("popularity", "window must span at least one day"));
        }
        let Some(anchor) = self.anchor.or_else(|| self.data_index.latest_timestamp()) else {
            return Ok(Vec::new());
        };

        let mut stats: Vec<PopularityStats> = self
            .data_index
            .movie_stats_between(window.start(anchor), anchor)
            .into_iter()
            .map(|(movie_id, stats)| PopularityStats {
                movie_id,
                count: stats.rating_count,
                mean_rating: (stats.avg_rating > 0.0).then_some(stats.avg_rating),
            })
            .collect();
        stats.sort_by(PopularityStats::ranking);

        debug!(anchor, items = stats.len(), "Computed popularity");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{FeedbackKind, Interaction, Movie};

    const DAY: i64 = 86_400;

    fn build_index() -> Arc<DataIndex> {
        let mut index = DataIndex::new();
        for id in 1..=4 {
            index.insert_movie(Movie::new(id, format!("Movie {id}"), None, ["Drama"]));
        }
        let now = 100 * DAY;
        // Movie 1 was popular long ago; 2 and 3 tie recently; 4 once recently
        for user in 1..=5 {
            index.record_interaction(Interaction::rating(user, 1, 5.0, now - 30 * DAY));
        }
        for user in 1..=2 {
            index.record_interaction(Interaction::rating(user, 3, 4.0, now - DAY));
            index.record_interaction(Interaction::implicit(user, 2, FeedbackKind::View, now - DAY));
        }
        index.record_interaction(Interaction::rating(3, 4, 3.0, now));
        Arc::new(index)
    }

    fn ids(stats: &[PopularityStats]) -> Vec<u32> {
        stats.iter().map(|s| s.movie_id).collect()
    }

    #[test]
    fn test_window_defaults_to_latest_interaction() {
        let popularity = CatalogPopularity::new(build_index());

        let stats = popularity.popularity(TrendingWindow::default()).unwrap();

        assert_eq!(ids(&stats), vec![2, 3, 4]);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].mean_rating, None);
        assert_eq!(stats[1].mean_rating, Some(4.0));
    }

    #[test]
    fn test_wider_window_includes_older_interactions() {
        let popularity = CatalogPopularity::new(build_index());

        let stats = popularity.popularity(TrendingWindow::days(60)).unwrap();

        assert_eq!(ids(&stats), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_explicit_anchor() {
        let popularity = CatalogPopularity::new(build_index()).with_anchor(75 * DAY);

        let stats = popularity.popularity(TrendingWindow::days(7)).unwrap();

        assert_eq!(ids(&stats), vec![1]);
        assert_eq!(stats[0].count, 5);
    }

    #[test]
    fn test_zero_day_window_is_invalid() {
        let popularity = CatalogPopularity::new(build_index());

        let result = popularity.popularity(TrendingWindow::days(0));

        assert!(matches!(result, Err(SourceError::InvalidRequest { .. })));
    }

    #[test]
    fn test_empty_log() {
        let popularity = CatalogPopularity::new(Arc::new(DataIndex::new()));
        assert!(popularity.popularity(TrendingWindow::default()).unwrap().is_empty());
    }
}
