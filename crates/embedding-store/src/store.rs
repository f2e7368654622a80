//! The live embedding store.
//!
//! Holds the currently published [`Generation`] behind a single swappable
//! `Arc`. Readers clone the `Arc` under a shared lock and keep using that
//! snapshot for the whole request, so a concurrent publish never exposes a
//! mix of two generations.

use crate::generation::{Generation, GenerationId};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct EmbeddingStore {
    current: RwLock<Option<Arc<Generation>>>,
    last_id: AtomicU64,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the served generation wholesale and return its new id
    pub fn publish(&self, mut generation: Generation) -> GenerationId {
        let id = GenerationId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        generation.set_id(id);

        info!(
            generation = %id,
            users = generation.users().len(),
            items = generation.items().len(),
            dimensions = generation.dimensions(),
            "Publishing embedding generation"
        );

        let generation = Arc::new(generation);
        *self.current.write() = Some(generation);
        id
    }

    /// Snapshot of the served generation, if any has been published
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.read().clone()
    }

    pub fn current_id(&self) -> Option<GenerationId> {
        self.current.read().as_ref().map(|generation| generation.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmbeddingTable, TagVocabulary};
    use std::thread;

    fn constant_generation(value: f32) -> Generation {
        let mut users = EmbeddingTable::new(4).unwrap();
        let mut items = EmbeddingTable::new(4).unwrap();
        for id in 0..50 {
            users.upsert(id, &[value; 4]).unwrap();
            items.upsert(id, &[value; 4]).unwrap();
        }
        let tags = EmbeddingTable::new(4).unwrap();
        Generation::new(4, users, items, tags, TagVocabulary::new(50, Vec::new())).unwrap()
    }

    #[test]
    fn test_publish_assigns_increasing_ids() {
        let store = EmbeddingStore::new();
        assert!(store.current().is_none());

        let first = store.publish(constant_generation(1.0));
        let second = store.publish(constant_generation(2.0));

        assert!(second > first);
        assert_eq!(store.current_id(), Some(second));
        assert_eq!(store.current().unwrap().items().get(0).unwrap(), &[2.0; 4]);
    }

    #[test]
    fn test_snapshot_survives_publish() {
        let store = EmbeddingStore::new();
        store.publish(constant_generation(1.0));

        let snapshot = store.current().unwrap();
        store.publish(constant_generation(2.0));

        assert_eq!(snapshot.users().get(7).unwrap(), &[1.0; 4]);
    }

    #[test]
    fn test_readers_never_see_mixed_generations() {
        let store = Arc::new(EmbeddingStore::new());
        store.publish(constant_generation(0.0));

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 1..=200 {
                    store.publish(constant_generation(round as f32));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let generation = store.current().unwrap();
                        let expected = generation.users().get(0).unwrap()[0];
                        for (_, vector) in generation.items().iter() {
                            assert!(vector.iter().all(|&v| v == expected));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
