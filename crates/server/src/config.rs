//! Serving configuration.

use embedding_store::Metric;
use sources::TrendingWindow;
use std::time::Duration;

/// Knobs for [`crate::RecommendationOrchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Longest wait for the popularity or metadata provider
    pub provider_timeout: Duration,
    /// Window used for the cold-start fallback
    pub default_window: TrendingWindow,
    /// Metric ranking items against a user vector
    pub recommend_metric: Metric,
    /// Metric ranking items against another item
    pub similar_metric: Metric,
    /// Build a transient vector for users with history but no embedding
    pub fold_in: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(2),
            default_window: TrendingWindow::default(),
            recommend_metric: Metric::Dot,
            similar_metric: Metric::Cosine,
            fold_in: false,
        }
    }
}

impl EngineConfig {
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_default_window(mut self, window: TrendingWindow) -> Self {
        self.default_window = window;
        self
    }

    pub fn with_recommend_metric(mut self, metric: Metric) -> Self {
        self.recommend_metric = metric;
        self
    }

    pub fn with_similar_metric(mut self, metric: Metric) -> Self {
        self.similar_metric = metric;
        self
    }

    pub fn with_fold_in(mut self, enabled: bool) -> Self {
        self.fold_in = enabled;
        self
    }
}
