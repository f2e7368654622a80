//! Fixed-dimension embedding table with exact nearest-neighbour search.
//!
//! Vectors live in one contiguous arena (`data`), row `r` occupying
//! `data[r * dimensions..(r + 1) * dimensions]`, with an id → row map for
//! O(1) lookups. Upserting an existing id overwrites its row in place.

use crate::error::{Result, StoreError};
use crate::metric::{Metric, norm};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// One search hit: an id and its score under the query metric (higher is closer)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u32,
    pub score: f32,
}

impl Neighbor {
    /// Ranking order: higher score first, ascending id on ties.
    ///
    /// `-0.0` and `+0.0` compare as one score.
    pub fn ranking(a: &Neighbor, b: &Neighbor) -> Ordering {
        let (a_score, b_score) = (a.score + 0.0, b.score + 0.0);
        b_score.total_cmp(&a_score).then_with(|| a.id.cmp(&b.id))
    }
}

/// Heap entry ordered so the worst-ranked neighbour is the maximum
struct Ranked(Neighbor);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        Neighbor::ranking(&self.0, &other.0)
    }
}

/// Serialized layout of a table; the id → row map is rebuilt on load
#[derive(Serialize, Deserialize)]
struct RawTable {
    dimensions: usize,
    ids: Vec<u32>,
    data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct EmbeddingTable {
    dimensions: usize,
    ids: Vec<u32>,
    data: Vec<f32>,
    rows: HashMap<u32, usize>,
}

impl EmbeddingTable {
    /// Create an empty table for vectors of `dimensions` components
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(StoreError::InvalidDimensions(dimensions));
        }
        Ok(Self {
            dimensions,
            ids: Vec::new(),
            data: Vec::new(),
            rows: HashMap::new(),
        })
    }

    /// Create an empty table with room for `capacity` vectors
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Result<Self> {
        let mut table = Self::new(dimensions)?;
        table.ids.reserve(capacity);
        table.data.reserve(capacity * dimensions);
        table.rows.reserve(capacity);
        Ok(table)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn contains(&self, id: u32) -> bool {
        self.rows.contains_key(&id)
    }

    /// Insert or overwrite the vector stored for `id`
    pub fn upsert(&mut self, id: u32, vector: &[f32]) -> Result<()> {
        self.check_vector(vector)?;
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::NonFinite { id });
        }

        match self.rows.get(&id) {
            Some(&row) => {
                let start = row * self.dimensions;
                self.data[start..start + self.dimensions].copy_from_slice(vector);
            }
            None => {
                self.rows.insert(id, self.ids.len());
                self.ids.push(id);
                self.data.extend_from_slice(vector);
            }
        }
        Ok(())
    }

    /// The stored vector for `id`, exactly as written
    pub fn get(&self, id: u32) -> Option<&[f32]> {
        let row = *self.rows.get(&id)?;
        let start = row * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    /// Iterate `(id, vector)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[f32])> {
        self.ids
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.dimensions))
    }

    /// The `k` stored ids closest to `query` under `metric`, skipping `exclude`.
    ///
    /// Exclusions are applied during the single scan, so up to `k` results are
    /// returned whenever enough non-excluded ids exist. Results are ordered by
    /// descending score with ascending id on ties; fewer than `k` ids yields
    /// all of them.
    pub fn nearest(
        &self,
        query: &[f32],
        k: usize,
        exclude: &HashSet<u32>,
        metric: Metric,
    ) -> Result<Vec<Neighbor>> {
        self.check_vector(query)?;
        if query.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::NonFiniteQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(query);
        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k + 1);

        for (id, vector) in self.iter() {
            if exclude.contains(&id) {
                continue;
            }
            let candidate = Neighbor {
                id,
                score: metric.score_prepared(query, query_norm, vector),
            };
            if heap.len() < k {
                heap.push(Ranked(candidate));
            } else if let Some(mut worst) = heap.peek_mut()
                && Neighbor::ranking(&candidate, &worst.0) == Ordering::Less
            {
                *worst = Ranked(candidate);
            }
        }

        Ok(heap.into_sorted_vec().into_iter().map(|r| r.0).collect())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                found: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<RawTable> for EmbeddingTable {
    type Error = StoreError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = Self::with_capacity(raw.dimensions, raw.ids.len())?;
        if raw.data.len() != raw.ids.len() * raw.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: raw.ids.len() * raw.dimensions,
                found: raw.data.len(),
            });
        }
        for (&id, vector) in raw.ids.iter().zip(raw.data.chunks_exact(raw.dimensions)) {
            if table.contains(id) {
                return Err(StoreError::DuplicateId(id));
            }
            table.upsert(id, vector)?;
        }
        Ok(table)
    }
}

impl From<EmbeddingTable> for RawTable {
    fn from(table: EmbeddingTable) -> Self {
        RawTable {
            dimensions: table.dimensions,
            ids: table.ids,
            data: table.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(u32, [f32; 2])]) -> EmbeddingTable {
        let mut table = EmbeddingTable::new(2).unwrap();
        for (id, vector) in rows {
            table.upsert(*id, vector).unwrap();
        }
        table
    }

    fn ids(neighbors: &[Neighbor]) -> Vec<u32> {
        neighbors.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_upsert_then_get_is_bit_exact() {
        let mut table = EmbeddingTable::new(3).unwrap();
        let vector = [0.1_f32, -1.0e-7, 123_456.79];
        table.upsert(42, &vector).unwrap();

        let stored = table.get(42).unwrap();
        for (a, b) in stored.iter().zip(&vector) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut table = table(&[(1, [1.0, 0.0]), (2, [0.0, 1.0])]);
        table.upsert(1, &[5.0, 5.0]).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap(), &[5.0, 5.0]);
        assert_eq!(table.ids(), &[1, 2]);
    }

    #[test]
    fn test_rejects_bad_vectors() {
        let mut table = EmbeddingTable::new(2).unwrap();
        assert!(matches!(
            table.upsert(1, &[1.0]),
            Err(StoreError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(table.upsert(1, &[f32::NAN, 0.0]), Err(StoreError::NonFinite { id: 1 })));
        assert!(EmbeddingTable::new(0).is_err());
        assert!(table.get(1).is_none());
    }

    #[test]
    fn test_nearest_orders_by_metric() {
        let table = table(&[(1, [1.0, 0.0]), (2, [0.9, 0.1]), (3, [-1.0, 0.0])]);
        let none = HashSet::new();

        let hits = table.nearest(&[1.0, 0.0], 3, &none, Metric::Cosine).unwrap();
        assert_eq!(ids(&hits), vec![1, 2, 3]);

        let hits = table.nearest(&[1.0, 0.0], 2, &none, Metric::Euclidean).unwrap();
        assert_eq!(ids(&hits), vec![1, 2]);
    }

    #[test]
    fn test_nearest_excludes_without_shrinking_result() {
        let table = table(&[(1, [1.0, 0.0]), (2, [0.9, 0.1]), (3, [0.5, 0.5]), (4, [-1.0, 0.0])]);
        let exclude: HashSet<u32> = [1, 2].into_iter().collect();

        let hits = table.nearest(&[1.0, 0.0], 2, &exclude, Metric::Cosine).unwrap();
        assert_eq!(ids(&hits), vec![3, 4]);
    }

    #[test]
    fn test_nearest_returns_all_when_fewer_than_k() {
        let table = table(&[(7, [1.0, 0.0]), (3, [0.0, 1.0])]);
        let hits = table.nearest(&[1.0, 1.0], 10, &HashSet::new(), Metric::Dot).unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|n| table.contains(n.id)));
    }

    #[test]
    fn test_nearest_breaks_ties_by_ascending_id() {
        let table = table(&[(9, [1.0, 1.0]), (4, [1.0, 1.0]), (6, [1.0, 1.0]), (1, [0.0, 0.0])]);
        let hits = table.nearest(&[1.0, 0.0], 2, &HashSet::new(), Metric::Dot).unwrap();

        assert_eq!(ids(&hits), vec![4, 6]);
    }

    #[test]
    fn test_signed_zero_scores_tie_by_id() {
        let negative = Neighbor { id: 1, score: -0.0 };
        let positive = Neighbor { id: 2, score: 0.0 };
        assert_eq!(Neighbor::ranking(&negative, &positive), Ordering::Less);
        assert_eq!(Neighbor::ranking(&positive, &negative), Ordering::Greater);

        // Dot scores of -0.0 (zero vector) and +0.0 (orthogonal vector)
        let table = table(&[(1, [0.0, 0.0]), (2, [1.0, -1.0])]);
        let nearest = table.nearest(&[-1.0, -1.0], 2, &HashSet::new(), Metric::Dot).unwrap();
        assert_eq!(ids(&nearest), vec![1, 2]);
    }

    #[test]
    fn test_nearest_checks_query_dimensions() {
        let table = table(&[(1, [1.0, 0.0])]);
        assert!(table.nearest(&[1.0], 1, &HashSet::new(), Metric::Dot).is_err());
        assert!(table.nearest(&[1.0, 0.0], 0, &HashSet::new(), Metric::Dot).unwrap().is_empty());
    }

    #[test]
    fn test_serde_round_trip_rebuilds_lookup() {
        let table = table(&[(5, [0.25, -0.5]), (8, [1.5, 2.0])]);
        let json = serde_json::to_string(&table).unwrap();
        let restored: EmbeddingTable = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, table);
        assert_eq!(restored.get(8).unwrap(), &[1.5, 2.0]);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_ids() {
        let json = r#"{"dimensions":1,"ids":[3,3],"data":[1.0,2.0]}"#;
        assert!(serde_json::from_str::<EmbeddingTable>(json).is_err());
    }
}
