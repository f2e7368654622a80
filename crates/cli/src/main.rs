use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{DataIndex, MovieId, RATING_MAX, RATING_MIN, UserId};
use embedding_store::{EmbeddingStore, Generation, Metric};
use pipeline::{Evaluator, Hyperparameters, RatingPolicy, SplitStrategy, TrainingPipeline, WeightPolicy};
use server::{EngineConfig, MovieRecommendation, RecommendationOrchestrator};
use sources::{CatalogMetadata, CatalogPopularity, TrendingWindow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;

/// ReelRecs - Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "reel-recs")]
#[command(about = "Hybrid movie recommendation engine built on learned embeddings", long_about = None)]
struct Cli {
    /// Path to MovieLens dataset directory
    #[arg(short, long, env = "REEL_RECS_DATA_DIR", default_value = "data/ml-1m")]
    data_dir: PathBuf,

    /// Saved embedding generation to serve; trained on the fly when absent
    #[arg(short, long, env = "REEL_RECS_MODEL")]
    model: Option<PathBuf>,

    /// Similarity metric for nearest-neighbour queries (cosine, euclidean, dot)
    #[arg(long, env = "VECTOR_METRIC")]
    metric: Option<Metric>,

    /// Seed for training and evaluation splits
    #[arg(long, default_value = "42")]
    seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train embeddings on the full dataset and write the generation to disk
    Train {
        /// Where to write the generation
        #[arg(long, short)]
        output: PathBuf,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Hold out interactions, train on the rest and report Recall@K
    Evaluate {
        /// Cutoff for Recall@K
        #[arg(long, short, default_value = "10")]
        k: usize,

        /// Most recent interactions held out per user
        #[arg(long, default_value = "1")]
        holdout: usize,

        /// Hold out a random fraction of each user's interactions instead
        #[arg(long, conflicts_with = "holdout")]
        fraction: Option<f32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Get movie recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Build a vector from the user's history when they have none
        #[arg(long)]
        fold_in: bool,

        /// Show where each recommendation came from
        #[arg(long)]
        explain: bool,
    },

    /// Find movies similar to a movie
    Similar {
        /// Movie ID to find neighbours for
        #[arg(long)]
        movie_id: MovieId,

        /// Number of movies to return
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Most interacted-with movies in a trailing window
    Trending {
        /// Window length in days, ending at the newest interaction
        #[arg(long, default_value = "7")]
        days: u32,

        /// Number of movies to return
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a user's interaction history and tag preferences
    User {
        /// User ID to display
        #[arg(long)]
        user_id: UserId,
    },

    /// Search for movies by title
    Search {
        /// Movie title to search for (case-insensitive substring match)
        #[arg(long)]
        title: String,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

/// How explicit ratings become training weights
#[derive(Clone, Copy, ValueEnum)]
enum RatingMode {
    Direct,
    Rescaled,
    Binary,
}

#[derive(Args)]
struct TrainingArgs {
    /// Embedding dimensionality
    #[arg(long, default_value = "64")]
    dimensions: usize,

    /// Passes over the interaction data
    #[arg(long, default_value = "100")]
    epochs: usize,

    #[arg(long, default_value = "0.05")]
    learning_rate: f32,

    /// Negatives drawn per positive before giving up
    #[arg(long, default_value = "10")]
    negative_samples: usize,

    /// Worker shards; results are reproducible for a fixed value
    #[arg(long, default_value = "1")]
    parallelism: usize,

    /// Stop with an error when training takes longer (seconds)
    #[arg(long)]
    max_seconds: Option<u64>,

    #[arg(long, value_enum, default_value = "rescaled")]
    ratings: RatingMode,
}

impl TrainingArgs {
    fn pipeline(&self) -> TrainingPipeline {
        let mut hyperparameters = Hyperparameters::default()
            .with_dimensions(self.dimensions)
            .with_epochs(self.epochs)
            .with_learning_rate(self.learning_rate)
            .with_negative_samples(self.negative_samples)
            .with_parallelism(self.parallelism);
        if let Some(seconds) = self.max_seconds {
            hyperparameters = hyperparameters.with_max_duration(Duration::from_secs(seconds));
        }

        let ratings = match self.ratings {
            RatingMode::Direct => RatingPolicy::Direct,
            RatingMode::Rescaled => RatingPolicy::Rescaled {
                min: RATING_MIN,
                max: RATING_MAX,
            },
            RatingMode::Binary => RatingPolicy::Binary,
        };
        TrainingPipeline::new(hyperparameters).with_weight_policy(WeightPolicy::default().with_ratings(ratings))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load data index (this may take a moment)
    println!("Loading MovieLens dataset from {}...", cli.data_dir.display());
    let start = Instant::now();
    let data_index = Arc::new(
        DataIndex::load_from_files(&cli.data_dir)
            .context("Failed to load MovieLens dataset")?,
    );
    println!("{} Loaded dataset in {:?}", "✓".green(), start.elapsed());

    match &cli.command {
        Commands::Train { output, training } => handle_train(&data_index, output, training, cli.seed)?,
        Commands::Evaluate {
            k,
            holdout,
            fraction,
            json,
            training,
        } => {
            let strategy = match fraction {
                Some(fraction) => SplitStrategy::RandomFraction { fraction: *fraction },
                None => SplitStrategy::LeaveLastOut { per_user: *holdout },
            };
            handle_evaluate(&data_index, training, *k, strategy, &cli, *json)?
        }
        Commands::Recommend {
            user_id,
            limit,
            fold_in,
            explain,
        } => {
            let orchestrator = build_orchestrator(&cli, data_index, *fold_in).await?;
            let recommendations = orchestrator.recommend(*user_id, *limit).await?;
            print_recommendations(&format!("Recommendations for user {user_id}"), &recommendations, *explain);
        }
        Commands::Similar { movie_id, limit } => {
            let orchestrator = build_orchestrator(&cli, data_index, false).await?;
            let similar = orchestrator.similar(*movie_id, *limit).await?;
            print_recommendations(&format!("Movies similar to {movie_id}"), &similar, false);
        }
        Commands::Trending { days, limit } => {
            let orchestrator = serving_orchestrator(&cli, data_index, Arc::new(EmbeddingStore::new()), false);
            let trending = orchestrator.trending(TrendingWindow::days(*days), *limit).await?;
            print_recommendations(&format!("Trending over {days} days"), &trending, false);
        }
        Commands::User { user_id } => handle_user(&data_index, *user_id)?,
        Commands::Search { title } => handle_search(&data_index, title),
        Commands::Benchmark { requests, concurrent } => {
            let orchestrator = build_orchestrator(&cli, Arc::clone(&data_index), false).await?;
            handle_benchmark(&data_index, orchestrator, *requests, *concurrent).await?
        }
    }

    Ok(())
}

fn serving_orchestrator(
    cli: &Cli,
    data_index: Arc<DataIndex>,
    store: Arc<EmbeddingStore>,
    fold_in: bool,
) -> RecommendationOrchestrator {
    let mut config = EngineConfig::default().with_fold_in(fold_in);
    if let Some(metric) = cli.metric {
        config = config.with_recommend_metric(metric).with_similar_metric(metric);
    }

    RecommendationOrchestrator::new(
        Arc::clone(&data_index),
        store,
        Arc::new(CatalogPopularity::new(Arc::clone(&data_index))),
    )
    .with_metadata(Arc::new(CatalogMetadata::new(data_index)))
    .with_config(config)
}

/// Orchestrator serving the saved generation, or a freshly trained one
async fn build_orchestrator(
    cli: &Cli,
    data_index: Arc<DataIndex>,
    fold_in: bool,
) -> Result<RecommendationOrchestrator> {
    let orchestrator = serving_orchestrator(cli, data_index, Arc::new(EmbeddingStore::new()), fold_in);

    match &cli.model {
        Some(path) => {
            let generation = Generation::load(path)
                .with_context(|| format!("Failed to load generation from {}", path.display()))?;
            let id = orchestrator.publish(generation);
            info!(generation = %id, path = %path.display(), "Serving saved generation");
        }
        None => {
            println!("No --model given, training with default hyperparameters...");
            let start = Instant::now();
            let (id, _) = orchestrator
                .train_and_publish(TrainingPipeline::default(), cli.seed)
                .await
                .context("Training failed")?;
            println!("{} Trained {} in {:?}", "✓".green(), id, start.elapsed());
        }
    }
    Ok(orchestrator)
}

/// Handle the 'train' command
fn handle_train(data_index: &DataIndex, output: &Path, training: &TrainingArgs, seed: u64) -> Result<()> {
    let pipeline = training.pipeline();
    let run = pipeline
        .run(&data_index.all_interactions(), &data_index.item_tags(), seed)
        .context("Training failed")?;

    run.generation
        .save(output)
        .with_context(|| format!("Failed to write generation to {}", output.display()))?;

    let report = &run.report;
    println!("{}", "Training complete:".bold().blue());
    println!("{}Users: {}", "• ".green(), report.users);
    println!("{}Items: {}", "• ".green(), report.items);
    println!("{}Tags: {}", "• ".green(), report.tags);
    println!(
        "{}Interactions: {} accepted, {} superseded, {} unknown, {} non-positive",
        "• ".green(),
        report.matrix.accepted,
        report.matrix.superseded,
        report.matrix.unknown_ids,
        report.matrix.non_positive
    );
    println!("{}Passes: {} in {:?}", "• ".green(), report.passes, report.elapsed);
    println!("{} Wrote {}", "✓".green(), output.display());
    Ok(())
}

/// Handle the 'evaluate' command
fn handle_evaluate(
    data_index: &DataIndex,
    training: &TrainingArgs,
    k: usize,
    strategy: SplitStrategy,
    cli: &Cli,
    json: bool,
) -> Result<()> {
    let mut evaluator = Evaluator::new(training.pipeline());
    if let Some(metric) = cli.metric {
        evaluator = evaluator.with_metric(metric);
    }

    let report = evaluator
        .evaluate(&data_index.all_interactions(), &data_index.item_tags(), k, strategy, cli.seed)
        .context("Evaluation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format!("Recall@{}:", report.k).bold().blue());
    println!("{}Model: {:.4}", "• ".green(), report.recall_at_k);
    println!("{}Popularity baseline: {:.4}", "• ".cyan(), report.popularity_recall_at_k);
    println!("{}Users evaluated: {}", "• ".cyan(), report.users_evaluated);
    println!(
        "{}Split: {} train / {} test interactions",
        "• ".cyan(),
        report.train_interactions,
        report.test_interactions
    );
    Ok(())
}

/// Handle the 'user' command
fn handle_user(data_index: &DataIndex, user_id: UserId) -> Result<()> {
    if data_index.get_user(user_id).is_none() {
        return Err(anyhow!("User {} not found", user_id));
    }
    let mut interactions = data_index.get_user_interactions(user_id);

    println!("{}", format!("User ID: {}", user_id).bold().blue());

    let rated: Vec<f32> = interactions.iter().filter_map(|i| i.rating).collect();
    let avg_rating = if rated.is_empty() {
        0.0
    } else {
        rated.iter().sum::<f32>() / rated.len() as f32
    };
    println!("{}Interactions: {}", "• ".cyan(), interactions.len());
    println!("{}Ratings: {} (average {:.2})", "• ".cyan(), rated.len(), avg_rating);

    interactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.movie_id.cmp(&b.movie_id)));
    println!("Recent interactions:");
    for interaction in interactions.iter().take(10) {
        if let Some(movie) = data_index.get_movie(interaction.movie_id) {
            let detail = match interaction.rating {
                Some(rating) => format!("rated {rating}"),
                None => interaction.kind.to_string(),
            };
            println!("  - {} ({})", movie.title, detail);
        }
    }

    // Interaction count and mean rating per tag
    let mut tag_ratings: HashMap<&str, (u32, f32, u32)> = HashMap::new();
    for interaction in &interactions {
        if let Some(movie) = data_index.get_movie(interaction.movie_id) {
            for tag in &movie.genres {
                let entry = tag_ratings.entry(tag.as_str()).or_insert((0, 0.0, 0));
                entry.0 += 1;
                if let Some(rating) = interaction.rating {
                    entry.1 += rating;
                    entry.2 += 1;
                }
            }
        }
    }
    let mut tags: Vec<_> = tag_ratings.into_iter().collect();
    tags.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.0.cmp(b.0)));

    println!("Tag preferences:");
    for (tag, (count, rating_sum, rated)) in tags.iter().take(10) {
        if *rated > 0 {
            println!("  - {}: {} interactions, average rating {:.2}", tag, count, rating_sum / *rated as f32);
        } else {
            println!("  - {}: {} interactions", tag, count);
        }
    }
    Ok(())
}

/// Handle the 'search' command
fn handle_search(data_index: &DataIndex, title: &str) {
    let title_lower = title.to_lowercase();

    // (exact match first, average rating, movie id)
    let mut matches: Vec<(bool, f32, MovieId)> = data_index
        .get_all_movie_ids()
        .into_iter()
        .filter_map(|movie_id| {
            let movie = data_index.get_movie(movie_id)?;
            let movie_title = movie.title.to_lowercase();
            if !movie_title.contains(&title_lower) {
                return None;
            }
            let avg_rating = data_index
                .get_movie_stats(movie_id)
                .map(|s| s.avg_rating)
                .unwrap_or(0.0);
            Some((movie_title == title_lower, avg_rating, movie_id))
        })
        .collect();

    matches.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.total_cmp(&a.1))
            .then(a.2.cmp(&b.2))
    });

    println!("{}", format!("Search results for '{}':", title).bold().blue());
    for (_, _, movie_id) in matches.iter().take(20) {
        let Some(movie) = data_index.get_movie(*movie_id) else {
            continue;
        };
        let (avg_rating, count) = data_index
            .get_movie_stats(*movie_id)
            .map(|s| (s.avg_rating, s.rating_count))
            .unwrap_or((0.0, 0));
        println!(
            "{}: {} [{}] avg {:.2} ({} interactions)",
            movie_id,
            movie.title,
            movie.genres.join(", "),
            avg_rating,
            count
        );
    }
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    data_index: &DataIndex,
    orchestrator: RecommendationOrchestrator,
    requests: usize,
    concurrent: usize,
) -> Result<()> {
    let users = data_index.get_all_user_ids();
    if users.is_empty() {
        bail!("Dataset has no users to benchmark");
    }
    if requests == 0 || concurrent == 0 {
        bail!("--requests and --concurrent must be positive");
    }

    let user_ids: Vec<UserId> = (0..requests)
        .map(|_| users[rand::random_range(0..users.len())])
        .collect();

    let permits = Arc::new(Semaphore::new(concurrent));
    let wall_clock = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for user in user_ids {
        let orchestrator = orchestrator.clone();
        let permits = Arc::clone(&permits);
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            orchestrator.recommend(user, 20).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = wall_clock.elapsed();

    timings.sort();
    let percentile = |p: f32| timings[((timings.len() as f32 * p) as usize).min(timings.len() - 1)];
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;

    println!("{}", "Benchmark results:".bold().blue());
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} requests/second", requests as f32 / total_time.as_secs_f32());

    Ok(())
}

/// Helper function to format and print recommendations
fn print_recommendations(heading: &str, recommendations: &[MovieRecommendation], explain: bool) {
    println!("{}", format!("{heading}:").bold().blue());
    if recommendations.is_empty() {
        println!("  (no results)");
        return;
    }

    for (rank, rec) in recommendations.iter().enumerate() {
        let rank = (rank + 1).to_string().green();
        match &rec.metadata {
            Some(metadata) => println!(
                "{}. {} [{}] - Score: {:.3}",
                rank,
                metadata.title,
                metadata.tags.join(", "),
                rec.score
            ),
            None => println!("{}. movie {} - Score: {:.3}", rank, rec.movie_id, rec.score),
        }
        if explain {
            println!("   Source: {:?}", rec.source);
        }
    }
}
