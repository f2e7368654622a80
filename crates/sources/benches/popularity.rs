//! Benchmarks for popularity aggregation
//!
//! Run with: cargo bench --package sources
//!
//! Uses the MovieLens 1M files when present, a synthetic log otherwise.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use data_loader::{DataIndex, Interaction, Movie};
use sources::{CatalogPopularity, PopularityProvider, TrendingWindow};
use std::path::Path;
use std::sync::Arc;

fn synthetic_index() -> DataIndex {
    let mut index = DataIndex::new();
    for id in 1..=2_000u32 {
        index.insert_movie(Movie::new(id, format!("Movie {id}"), None, ["Drama"]));
    }
    for user in 1..=2_000u32 {
        for step in 0..50u32 {
            let movie = (user * 7 + step * 13) % 2_000 + 1;
            let timestamp = (user as i64 * 50 + step as i64) * 600;
            index.record_interaction(Interaction::rating(user, movie, 4.0, timestamp));
        }
    }
    index
}

fn load_test_data() -> Arc<DataIndex> {
    let data_dir = Path::new("../../data/ml-1m");
    let index = DataIndex::load_from_files(data_dir).unwrap_or_else(|_| synthetic_index());
    Arc::new(index)
}

fn bench_popularity(c: &mut Criterion) {
    let popularity = CatalogPopularity::new(load_test_data());

    for days in [7, 365] {
        c.bench_function(&format!("popularity_{days}d"), |b| {
            b.iter(|| {
                let stats = popularity.popularity(black_box(TrendingWindow::days(days))).unwrap();
                black_box(stats)
            })
        });
    }
}

criterion_group!(benches, bench_popularity);
criterion_main!(benches);
