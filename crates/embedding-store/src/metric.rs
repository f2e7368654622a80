//! Similarity metrics.
//!
//! Every metric is expressed as a score where higher means closer, so the
//! nearest-neighbour search can rank all of them the same way.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric used to rank neighbours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity; zero vectors score 0.0 against everything
    #[default]
    Cosine,
    /// Negated Euclidean distance
    Euclidean,
    /// Raw inner product, the score the factorization model is trained on
    Dot,
}

impl Metric {
    /// Score `candidate` against `query`
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine(query, norm(query), candidate),
            Metric::Euclidean => -euclidean(query, candidate),
            Metric::Dot => dot(query, candidate),
        }
    }

    /// Like [`Metric::score`] with the query norm precomputed, for scans
    pub(crate) fn score_prepared(self, query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine(query, query_norm, candidate),
            _ => self.score(query, candidate),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dot => "dot",
        };
        f.write_str(name)
    }
}

impl FromStr for Metric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" | "cos" => Ok(Metric::Cosine),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "dot" | "inner" | "ip" => Ok(Metric::Dot),
            other => Err(StoreError::UnknownMetric(other.to_string())),
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let candidate_norm = norm(candidate);
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    dot(query, candidate) / (query_norm * candidate_norm)
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine() {
        assert!((Metric::Cosine.score(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((Metric::Cosine.score(&[1.0, 0.0], &[-3.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(Metric::Cosine.score(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_euclidean_is_negated_distance() {
        assert_eq!(Metric::Euclidean.score(&[0.0, 0.0], &[3.0, 4.0]), -5.0);
        assert!(Metric::Euclidean.score(&[0.0, 0.0], &[1.0, 0.0]) > Metric::Euclidean.score(&[0.0, 0.0], &[2.0, 0.0]));
    }

    #[test]
    fn test_dot() {
        assert_eq!(Metric::Dot.score(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("COSINE".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!("l2".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert_eq!("ip".parse::<Metric>().unwrap(), Metric::Dot);
        assert!("manhattan".parse::<Metric>().is_err());
        assert_eq!(Metric::Euclidean.to_string(), "euclidean");
    }
}
