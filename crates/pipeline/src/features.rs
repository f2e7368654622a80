//! Item feature matrix.
//!
//! Column layout for `n` items and `t` distinct tags:
//!
//! ```text
//! [0, n)        one identity column per item, in item-index order
//! [n, n + t)    one column per tag, tags sorted by name
//! ```
//!
//! Every stored cell has value 1.0, so an item's effective embedding is the
//! sum of the embeddings of its identity column and of its tag columns. The
//! identity column lets interaction signal separate items that share tags.

use crate::interactions::IdMapping;
use data_loader::MovieId;
use embedding_store::TagVocabulary;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Binary item-by-feature matrix in CSR form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatrix {
    n_items: usize,
    n_features: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
}

impl FeatureMatrix {
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Identity columns plus tag columns
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Feature columns of one item, identity column first then tags ascending
    pub fn row(&self, item: usize) -> &[u32] {
        &self.indices[self.indptr[item]..self.indptr[item + 1]]
    }

    /// Cell value; 1.0 for every stored feature, 0.0 otherwise
    pub fn value(&self, item: usize, feature: usize) -> f32 {
        if item >= self.n_items {
            return 0.0;
        }
        if self.row(item).contains(&(feature as u32)) {
            1.0
        } else {
            0.0
        }
    }
}

/// Build the feature matrix and tag vocabulary for `items`.
///
/// Tags attached to ids outside the mapping are ignored; items without tags
/// carry only their identity column.
pub fn build_feature_matrix(
    item_tags: &HashMap<MovieId, Vec<String>>,
    items: &IdMapping,
) -> (FeatureMatrix, TagVocabulary) {
    let distinct: BTreeSet<&str> = items
        .ids()
        .iter()
        .filter_map(|id| item_tags.get(id))
        .flatten()
        .map(String::as_str)
        .collect();
    let vocabulary = TagVocabulary::new(items.len(), distinct.into_iter().map(str::to_string));

    let mut indptr = Vec::with_capacity(items.len() + 1);
    let mut indices = Vec::with_capacity(items.len());
    indptr.push(0);

    for (index, id) in items.ids().iter().enumerate() {
        indices.push(index as u32);

        let mut columns: Vec<u32> = item_tags
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|tag| vocabulary.column(tag))
            .map(|column| column as u32)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        indices.extend(columns);

        indptr.push(indices.len());
    }

    let matrix = FeatureMatrix {
        n_items: items.len(),
        n_features: items.len() + vocabulary.len(),
        indptr,
        indices,
    };

    debug!(
        items = matrix.n_items,
        tags = vocabulary.len(),
        features = matrix.n_features,
        "Built feature matrix"
    );

    (matrix, vocabulary)
}
