//! Metadata enrichment.
//!
//! Metadata only decorates results. A provider that fails or omits an item
//! never changes which items are served or in what order.

use crate::error::Result;
use crate::types::ItemMetadata;
use data_loader::{DataIndex, MovieId};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of display metadata for items.
pub trait MetadataProvider: Send + Sync {
    /// Metadata for whichever of `ids` the provider knows; unknown ids are
    /// simply absent from the map
    fn metadata(&self, ids: &[MovieId]) -> Result<HashMap<MovieId, ItemMetadata>>;
}

/// Metadata read straight from the catalog.
pub struct CatalogMetadata {
    data_index: Arc<DataIndex>,
}

impl CatalogMetadata {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }
}

impl MetadataProvider for CatalogMetadata {
    fn metadata(&self, ids: &[MovieId]) -> Result<HashMap<MovieId, ItemMetadata>> {
        Ok(ids
            .iter()
            .filter_map(|&id| self.data_index.get_movie(id))
            .map(|movie| (movie.id, ItemMetadata::from(movie)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::Movie;

    #[test]
    fn test_catalog_metadata() {
        let mut index = DataIndex::new();
        index.insert_movie(
            Movie::new(1, "Alien (1979)", Some(1979), ["Sci-Fi", "Horror"])
                .with_metadata(Some("In space...".to_string()), Some("/alien.jpg".to_string())),
        );
        let provider = CatalogMetadata::new(Arc::new(index));

        let metadata = provider.metadata(&[1, 2]).unwrap();

        assert_eq!(metadata.len(), 1);
        let alien = &metadata[&1];
        assert_eq!(alien.year, Some(1979));
        assert_eq!(alien.tags, vec!["Horror", "Sci-Fi"]);
        assert_eq!(alien.image.as_deref(), Some("/alien.jpg"));
    }
}
