//! Benchmarks for one training pass
//!
//! Run with: cargo bench --package pipeline
//!
//! Uses a synthetic catalog so the benchmark runs without the MovieLens files.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use data_loader::{Interaction, MovieId};
use pipeline::{Hyperparameters, TrainingPipeline};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const USERS: u32 = 500;
const MOVIES: u32 = 1_000;
const PER_USER: usize = 40;
const TAGS: [&str; 6] = ["Action", "Comedy", "Drama", "Horror", "Romance", "Thriller"];

fn synthetic_data() -> (Vec<Interaction>, HashMap<MovieId, Vec<String>>) {
    let mut rng = StdRng::seed_from_u64(17);
    let item_tags = (1..=MOVIES)
        .map(|id| {
            let tags = vec![TAGS[id as usize % TAGS.len()].to_string()];
            (id, tags)
        })
        .collect();

    let interactions = (1..=USERS)
        .flat_map(|user| {
            (0..PER_USER)
                .map(|_| {
                    let movie = rng.random_range(1..=MOVIES);
                    let rating = rng.random_range(1..=5) as f32;
                    Interaction::rating(user, movie, rating, 0)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    (interactions, item_tags)
}

fn bench_training(c: &mut Criterion) {
    let (interactions, item_tags) = synthetic_data();

    for parallelism in [1, 4] {
        let params = Hyperparameters::default()
            .with_dimensions(32)
            .with_epochs(1)
            .with_parallelism(parallelism);
        let pipeline = TrainingPipeline::new(params);

        c.bench_function(&format!("train_one_pass_{parallelism}_shards"), |b| {
            b.iter(|| {
                let run = pipeline
                    .run(black_box(&interactions), black_box(&item_tags), 42)
                    .unwrap();
                black_box(run)
            })
        });
    }
}

criterion_group!(benches, bench_training);
criterion_main!(benches);
