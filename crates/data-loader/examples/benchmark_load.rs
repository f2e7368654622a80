//! Times catalog loading and the popularity aggregates built on top of it.
//!
//! Run with: cargo run --release --example benchmark_load -p data-loader [DATA_DIR]

use data_loader::DataIndex;
use std::path::PathBuf;
use std::time::Instant;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn main() -> data_loader::Result<()> {
    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/ml-1m"));

    println!("Loading catalog from {}...\n", data_dir.display());
    let start = Instant::now();
    let index = DataIndex::load_from_files(&data_dir)?;
    let load_time = start.elapsed();

    let (users, movies, interactions) = index.counts();
    println!("=== Catalog ===");
    println!("Load time: {:?}", load_time);
    println!("Users: {users}, movies: {movies}, interactions: {interactions}");
    println!(
        "Throughput: {:.0} interactions/second",
        interactions as f64 / load_time.as_secs_f64()
    );

    let Some(latest) = index.latest_timestamp() else {
        println!("\nNo interactions, skipping popularity aggregates");
        return Ok(());
    };

    println!("\n=== Trailing-window popularity ===");
    for days in [7, 30, 365] {
        let start = Instant::now();
        let stats = index.movie_stats_between(latest - days * SECONDS_PER_DAY, latest);
        let counted: u64 = stats.values().map(|s| s.rating_count as u64).sum();
        println!(
            "{days:>4}d: {} movies, {counted} interactions in {:?}",
            stats.len(),
            start.elapsed()
        );
    }
    Ok(())
}
