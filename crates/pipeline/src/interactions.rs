//! Sparse user-item interaction matrix.
//!
//! Rows are users, columns are items, both in ascending id order as assigned
//! by [`IdMapping`]. The matrix is stored in CSR form; within a row column
//! indices are ascending, which the trainer's negative sampler relies on.

use crate::config::WeightPolicy;
use data_loader::{Interaction, MovieId};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Dense index assignment for a set of external ids.
///
/// Ids are sorted ascending before indices are assigned, so the same id set
/// always yields the same mapping regardless of input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    ids: Vec<u32>,
    index: HashMap<u32, usize>,
}

impl IdMapping {
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { ids, index }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<u32> {
        self.ids.get(index).copied()
    }

    /// Ids in index order
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }
}

/// Compressed sparse row matrix of positive interaction weights.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    weights: Vec<f32>,
}

impl InteractionMatrix {
    /// Build from per-row maps of column to weight
    fn from_rows(n_cols: usize, rows: Vec<BTreeMap<u32, f32>>) -> Self {
        let n_rows = rows.len();
        let nnz = rows.iter().map(BTreeMap::len).sum();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);

        indptr.push(0);
        for row in rows {
            for (column, weight) in row {
                indices.push(column);
                weights.push(weight);
            }
            indptr.push(indices.len());
        }

        Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            weights,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored (non-zero) cells
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Column indices (ascending) and weights of one row
    pub fn row(&self, row: usize) -> (&[u32], &[f32]) {
        let start = self.indptr[row];
        let end = self.indptr[row + 1];
        (&self.indices[start..end], &self.weights[start..end])
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f32> {
        if row >= self.n_rows {
            return None;
        }
        let (columns, weights) = self.row(row);
        columns
            .binary_search(&(column as u32))
            .ok()
            .map(|position| weights[position])
    }
}

/// Counts from one matrix build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Cells stored in the matrix
    pub accepted: usize,
    /// Records replaced by a later record for the same pair
    pub superseded: usize,
    /// Records whose user or item is not in the mapping
    pub unknown_ids: usize,
    /// Records whose weight came out zero, negative or non-finite
    pub non_positive: usize,
}

/// Build the interaction matrix for the given mappings.
///
/// At most one cell exists per (user, item) pair; when a pair repeats, the
/// record appearing last wins. Records naming ids outside the mappings are
/// skipped and counted rather than failing the build.
pub fn build_interaction_matrix<'a>(
    interactions: impl IntoIterator<Item = &'a Interaction>,
    users: &IdMapping,
    items: &IdMapping,
    policy: &WeightPolicy,
) -> (InteractionMatrix, BuildReport) {
    let mut rows: Vec<BTreeMap<u32, f32>> = vec![BTreeMap::new(); users.len()];
    let mut report = BuildReport::default();

    for interaction in interactions {
        let (Some(row), Some(column)) = (
            users.index_of(interaction.user_id),
            items.index_of(interaction.movie_id),
        ) else {
            report.unknown_ids += 1;
            continue;
        };

        let weight = policy.weight(interaction);
        let column = column as u32;
        if !(weight.is_finite() && weight > 0.0) {
            // A later non-positive record still replaces an earlier one
            if rows[row].remove(&column).is_some() {
                report.superseded += 1;
            }
            report.non_positive += 1;
            continue;
        }

        if rows[row].insert(column, weight).is_some() {
            report.superseded += 1;
        }
    }

    let matrix = InteractionMatrix::from_rows(items.len(), rows);
    report.accepted = matrix.nnz();

    if report.unknown_ids > 0 {
        warn!(
            skipped = report.unknown_ids,
            "Skipped interactions referencing unknown users or items"
        );
    }
    debug!(
        users = matrix.n_rows(),
        items = matrix.n_cols(),
        accepted = report.accepted,
        superseded = report.superseded,
        non_positive = report.non_positive,
        "Built interaction matrix"
    );

    (matrix, report)
}

/// Mapping over every user that appears in `interactions`
pub fn user_mapping<'a>(interactions: impl IntoIterator<Item = &'a Interaction>) -> IdMapping {
    IdMapping::from_ids(interactions.into_iter().map(|i| i.user_id))
}

/// Mapping over every catalog item plus any item seen in `interactions`
pub fn item_mapping<'a>(
    catalog: impl IntoIterator<Item = MovieId>,
    interactions: impl IntoIterator<Item = &'a Interaction>,
) -> IdMapping {
    IdMapping::from_ids(
        catalog
            .into_iter()
            .chain(interactions.into_iter().map(|i| i.movie_id)),
    )
}
