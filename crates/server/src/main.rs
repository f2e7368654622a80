//! Test harness for the recommendation orchestrator.
//!
//! Loads the catalog, trains and publishes a generation, then prints
//! recommendations, similar movies and trending movies.
//!
//! Usage: server [DATA_DIR] [USER_ID]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use data_loader::DataIndex;
use embedding_store::EmbeddingStore;
use pipeline::{Hyperparameters, TrainingPipeline};
use server::{MovieRecommendation, RecommendationOrchestrator};
use sources::{CatalogMetadata, CatalogPopularity, TrendingWindow};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,server=debug,sources=debug,pipeline=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "data/ml-1m".to_string()));
    let user_id: u32 = match args.next() {
        Some(raw) => raw.parse().context("USER_ID must be an integer")?,
        None => 1,
    };

    info!("Starting ReelRecs server test harness");
    let data_index = Arc::new(
        DataIndex::load_from_files(&data_dir)
            .with_context(|| format!("loading data from {}", data_dir.display()))?,
    );

    let orchestrator = RecommendationOrchestrator::new(
        Arc::clone(&data_index),
        Arc::new(EmbeddingStore::new()),
        Arc::new(CatalogPopularity::new(Arc::clone(&data_index))),
    )
    .with_metadata(Arc::new(CatalogMetadata::new(Arc::clone(&data_index))));

    let pipeline = TrainingPipeline::new(Hyperparameters::default());
    let (generation, report) = orchestrator.train_and_publish(pipeline, 42).await?;
    info!(
        generation = %generation,
        users = report.users,
        items = report.items,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Model ready"
    );

    let limit = 10;
    let recommendations = orchestrator.recommend(user_id, limit).await?;
    print_list(&format!("Recommendations for user {user_id}"), &recommendations);

    if let Some(first) = recommendations.first() {
        let similar = orchestrator.similar(first.movie_id, limit).await?;
        print_list(&format!("Similar to movie {}", first.movie_id), &similar);
    }

    let trending = orchestrator.trending(TrendingWindow::days(30), limit).await?;
    print_list("Trending over 30 days", &trending);

    Ok(())
}

fn print_list(heading: &str, recommendations: &[MovieRecommendation]) {
    info!("{heading}: {} results", recommendations.len());
    for (i, rec) in recommendations.iter().enumerate() {
        let title = rec
            .metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or("<unknown>");
        info!("{:>2}. {} - Score: {:.3} [{:?}]", i + 1, title, rec.score, rec.source);
    }
}
