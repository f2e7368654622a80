//! Embedding generations.
//!
//! A generation is the complete output of one training run: user vectors,
//! effective item vectors, tag vectors and the tag vocabulary that maps tag
//! names to feature columns. It is immutable once built and is swapped into
//! service as a unit by [`crate::EmbeddingStore`].

use crate::error::{Result, StoreError};
use crate::table::EmbeddingTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Current layout version of [`TagVocabulary`]
pub const VOCABULARY_VERSION: u32 = 1;

/// Identifier of a published generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenerationId(pub u64);

impl GenerationId {
    /// Id carried by a generation that has not been published yet
    pub const UNPUBLISHED: GenerationId = GenerationId(0);
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Versioned assignment of tag names to feature-matrix columns.
///
/// Tag columns follow the per-item identity columns, so the tag at position
/// `p` of the sorted tag list owns column `first_column + p`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagVocabulary {
    version: u32,
    first_column: usize,
    tags: Vec<String>,
}

impl TagVocabulary {
    /// Build a vocabulary from distinct tags; they are sorted so that the same
    /// catalog always yields the same columns
    pub fn new(first_column: usize, tags: impl IntoIterator<Item = String>) -> Self {
        let mut tags: Vec<String> = tags.into_iter().collect();
        tags.sort();
        tags.dedup();
        Self {
            version: VOCABULARY_VERSION,
            first_column,
            tags,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Column of the first tag
    pub fn first_column(&self) -> usize {
        self.first_column
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Feature column assigned to `tag`
    pub fn column(&self, tag: &str) -> Option<usize> {
        self.tags
            .binary_search_by(|probe| probe.as_str().cmp(tag))
            .ok()
            .map(|position| self.first_column + position)
    }

    /// Tag that owns `column`
    pub fn tag(&self, column: usize) -> Option<&str> {
        let position = column.checked_sub(self.first_column)?;
        self.tags.get(position).map(String::as_str)
    }

    /// `(column, tag)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.tags
            .iter()
            .enumerate()
            .map(|(position, tag)| (self.first_column + position, tag.as_str()))
    }
}

/// One internally consistent set of embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    id: GenerationId,
    dimensions: usize,
    users: EmbeddingTable,
    items: EmbeddingTable,
    /// Tag embeddings keyed by feature column
    tags: EmbeddingTable,
    vocabulary: TagVocabulary,
}

impl Generation {
    /// Assemble a generation; all tables must share `dimensions`
    pub fn new(
        dimensions: usize,
        users: EmbeddingTable,
        items: EmbeddingTable,
        tags: EmbeddingTable,
        vocabulary: TagVocabulary,
    ) -> Result<Self> {
        let generation = Self {
            id: GenerationId::UNPUBLISHED,
            dimensions,
            users,
            items,
            tags,
            vocabulary,
        };
        generation.check_dimensions()?;
        Ok(generation)
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: GenerationId) {
        self.id = id;
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn users(&self) -> &EmbeddingTable {
        &self.users
    }

    /// Effective item vectors (identity plus tag embeddings)
    pub fn items(&self) -> &EmbeddingTable {
        &self.items
    }

    pub fn tag_embeddings(&self) -> &EmbeddingTable {
        &self.tags
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.vocabulary
    }

    /// Content-only vector for a tag set: the sum of the known tag embeddings.
    ///
    /// Returns `None` when none of the tags were seen at training time.
    pub fn embed_tags<S: AsRef<str>>(&self, tags: &[S]) -> Option<Vec<f32>> {
        let mut vector = vec![0.0; self.dimensions];
        let mut matched = false;
        for tag in tags {
            let Some(column) = self.vocabulary.column(tag.as_ref()) else {
                continue;
            };
            if let Some(embedding) = self.tags.get(column as u32) {
                for (acc, value) in vector.iter_mut().zip(embedding) {
                    *acc += value;
                }
                matched = true;
            }
        }
        matched.then_some(vector)
    }

    /// Write the generation as a single JSON document
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(
            generation = %self.id,
            users = self.users.len(),
            items = self.items.len(),
            path = %path.display(),
            "Saved embedding generation"
        );
        Ok(())
    }

    /// Read a generation written by [`Generation::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let generation: Generation = serde_json::from_reader(reader)?;
        generation.check_dimensions()?;
        info!(
            generation = %generation.id,
            users = generation.users.len(),
            items = generation.items.len(),
            path = %path.display(),
            "Loaded embedding generation"
        );
        Ok(generation)
    }

    fn check_dimensions(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(StoreError::InvalidDimensions(0));
        }
        for table in [&self.users, &self.items, &self.tags] {
            if table.dimensions() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    found: table.dimensions(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_generation() -> Generation {
        let vocabulary = TagVocabulary::new(2, ["Comedy".to_string(), "Action".to_string()]);
        let mut users = EmbeddingTable::new(2).unwrap();
        users.upsert(1, &[0.5, 0.25]).unwrap();
        let mut items = EmbeddingTable::new(2).unwrap();
        items.upsert(10, &[1.0, 0.0]).unwrap();
        items.upsert(11, &[0.0, 1.0]).unwrap();
        let mut tags = EmbeddingTable::new(2).unwrap();
        tags.upsert(2, &[0.1, 0.2]).unwrap();
        tags.upsert(3, &[0.3, 0.4]).unwrap();
        Generation::new(2, users, items, tags, vocabulary).unwrap()
    }

    #[test]
    fn test_vocabulary_columns() {
        let vocabulary = TagVocabulary::new(5, ["Drama".to_string(), "Action".to_string(), "Drama".to_string()]);

        assert_eq!(vocabulary.len(), 2);
        assert_eq!(vocabulary.version(), VOCABULARY_VERSION);
        assert_eq!(vocabulary.column("Action"), Some(5));
        assert_eq!(vocabulary.column("Drama"), Some(6));
        assert_eq!(vocabulary.column("Horror"), None);
        assert_eq!(vocabulary.tag(6), Some("Drama"));
        assert_eq!(vocabulary.tag(4), None);
    }

    #[test]
    fn test_new_rejects_mixed_dimensions() {
        let users = EmbeddingTable::new(2).unwrap();
        let items = EmbeddingTable::new(3).unwrap();
        let tags = EmbeddingTable::new(2).unwrap();
        let vocabulary = TagVocabulary::new(0, Vec::new());

        assert!(matches!(
            Generation::new(2, users, items, tags, vocabulary),
            Err(StoreError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_embed_tags_sums_known_tags() {
        let generation = sample_generation();

        let vector = generation.embed_tags(&["Action", "Comedy", "Unknown"]).unwrap();
        assert!((vector[0] - 0.4).abs() < 1e-6);
        assert!((vector[1] - 0.6).abs() < 1e-6);
        assert!(generation.embed_tags(&["Unknown"]).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let generation = sample_generation();
        let path = std::env::temp_dir().join(format!("generation-{}.json", std::process::id()));

        generation.save(&path).unwrap();
        let loaded = Generation::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, generation);
        assert_eq!(loaded.vocabulary().column("Comedy"), Some(3));
    }
}
