//! # vecstash CLI
//!
//! Run with: `cargo run --bin vecstash -- --data-dir ./data setup`
//!
//! Configuration comes from `vecstash.toml` (or `--config`), then
//! `VECSTASH_*` environment variables, then command-line flags.

mod synthetic;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vecstash_api::{builtin_embedder, IngestionPipeline, DEFAULT_BATCH_SIZE};
use vecstash_core::config::{LogFormat, LoggingConfig};
use vecstash_core::types::embedding_size;
use vecstash_core::{Config, Placement, RecordId};
use vecstash_storage::Store;

const DEFAULT_DATA_DIR: &str = "./vecstash-data";

const DEMO_SENTENCES: [&str; 7] = [
    "The cat sits on the mat",
    "A dog runs on the grass",
    "I love eating pizza",
    "The pepperoni slice was tasty",
    "Stock market crashed today",
    "Investment banking is hard",
    "Planets orbit the sun",
];

#[derive(Parser)]
#[command(name = "vecstash")]
#[command(about = "vecstash - embedded vector store with inline/overflow placement")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, default_value = "vecstash.toml")]
    config: PathBuf,

    /// Store directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and load the demo sentences
    Setup {
        /// Delete an existing store first
        #[arg(long)]
        reset: bool,
    },
    /// Add texts from stdin, one per line, until an empty line
    Seed,
    /// Search interactively until `q`
    Search {
        /// Number of matches to show
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Compare two texts interactively until `q`
    Compare,
    /// Bulk-load synthetic documents, then report placement
    Generate {
        /// Number of documents
        #[arg(long, default_value_t = 50_000)]
        count: usize,
        /// Embedding dimension for a new store
        #[arg(long)]
        dimension: Option<usize>,
        /// RNG seed for reproducible documents
        #[arg(long)]
        seed: Option<u64>,
        /// Delete an existing store first
        #[arg(long)]
        reset: bool,
    },
    /// Show record counts and segment occupancy
    Stats,
    /// Delete one record
    Delete { id: u64 },
    /// Write a snapshot and reset the journal
    Checkpoint,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .and_then(|c| c.with_env_overrides())
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.store.data_dir = Some(dir);
    }
    if config.store.data_dir.is_none() {
        config.store.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Setup { reset } => setup(config, reset).await,
        Commands::Seed => seed(config).await,
        Commands::Search { top_k } => {
            let k = top_k.unwrap_or(config.ingestion.top_k);
            search(config, k).await
        }
        Commands::Compare => compare(config).await,
        Commands::Generate {
            count,
            dimension,
            seed,
            reset,
        } => {
            if let Some(dimension) = dimension {
                config.store.dimension = dimension;
            }
            generate(config, count, seed, reset).await
        }
        Commands::Stats => stats(config),
        Commands::Delete { id } => delete(config, RecordId(id)),
        Commands::Checkpoint => checkpoint(config),
    }
}

/// Logs go to stderr so prompts and results own stdout. `RUST_LOG` wins
/// over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_store(config: &Config) -> Result<Arc<Store>> {
    let store = Store::open(config.store.clone()).context("opening store")?;
    Ok(Arc::new(store))
}

fn build_pipeline(config: &Config, store: Arc<Store>) -> Result<IngestionPipeline> {
    let embedder = builtin_embedder(&config.ingestion.model_name, store.dimension())?;
    Ok(IngestionPipeline::new(embedder, store)?.with_batch_size(config.ingestion.batch_size)?)
}

fn data_dir(config: &Config) -> Result<PathBuf> {
    config
        .store
        .data_dir
        .clone()
        .context("no data directory configured")
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(())
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

fn preview(embedding: &[f32]) -> String {
    let head: Vec<String> = embedding.iter().take(5).map(|x| format!("{:.4}", x)).collect();
    format!("[{}]... ({} dims)", head.join(", "), embedding.len())
}

async fn setup(config: Config, reset: bool) -> Result<()> {
    let dir = data_dir(&config)?;
    if Store::exists(&dir) {
        if !reset {
            bail!("{} already holds a store, pass --reset to recreate it", dir.display());
        }
        Store::destroy(&dir)?;
    }

    let store = Arc::new(Store::create(config.store.clone())?);
    let pipeline = build_pipeline(&config, Arc::clone(&store))?;
    println!("Generating vectors and inserting...");
    let ids = pipeline.ingest_batch(&DEMO_SENTENCES).await?;
    store.close()?;

    println!("Done! {} documents in {}", ids.len(), dir.display());
    Ok(())
}

async fn seed(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Enter texts (one per line, empty line to finish):");
    let mut texts = Vec::new();
    loop {
        prompt("> ")?;
        match read_line(&mut lines).await? {
            Some(text) if !text.is_empty() => texts.push(text),
            _ => break,
        }
    }

    if texts.is_empty() {
        println!("No texts entered");
        return Ok(());
    }

    // One commit for the whole session.
    let pipeline = build_pipeline(&config, Arc::clone(&store))?.with_batch_size(texts.len())?;
    let ids = pipeline.ingest_batch(&texts).await?;
    store.close()?;
    println!("Added {} documents", ids.len());
    Ok(())
}

async fn search(config: Config, k: usize) -> Result<()> {
    let store = open_store(&config)?;
    let pipeline = build_pipeline(&config, Arc::clone(&store))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Searching {} records", store.len());

    loop {
        prompt("\nSearch query (or 'q' to quit): ")?;
        let Some(query) = read_line(&mut lines).await? else { break };
        if query.eq_ignore_ascii_case("q") {
            break;
        }

        let matches = pipeline.search(&query, k).await?;
        println!("\nTop matches:");
        if matches.is_empty() {
            println!("  (store is empty)");
        }
        for m in matches {
            println!("  {:.4} - {}", m.similarity, m.content);
        }
    }

    store.close()?;
    Ok(())
}

async fn compare(config: Config) -> Result<()> {
    // Nothing is stored, so the on-disk store stays untouched.
    let mut scratch = config.store.clone();
    scratch.data_dir = None;
    let store = Arc::new(Store::create(scratch)?);
    let pipeline = build_pipeline(&config, Arc::clone(&store))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt("\nText 1 (or 'q' to quit): ")?;
        let Some(first) = read_line(&mut lines).await? else { break };
        if first.eq_ignore_ascii_case("q") {
            break;
        }
        prompt("Text 2: ")?;
        let Some(second) = read_line(&mut lines).await? else { break };

        let comparison = pipeline.compare(&first, &second).await?;
        println!("\nText 1 embedding: {}", preview(&comparison.first));
        println!("Text 2 embedding: {}", preview(&comparison.second));
        println!("\nSimilarity score: {:.4}", comparison.similarity);
    }

    store.close()?;
    Ok(())
}

async fn generate(config: Config, count: usize, seed: Option<u64>, reset: bool) -> Result<()> {
    let dir = data_dir(&config)?;
    if reset && Store::exists(&dir) {
        Store::destroy(&dir)?;
    }
    let store = open_store(&config)?;
    let pipeline = build_pipeline(&config, Arc::clone(&store))?.with_batch_size(DEFAULT_BATCH_SIZE)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!(
        "Generating {} documents ({} dims, {} bytes per embedding)...",
        count,
        store.dimension(),
        embedding_size(store.dimension())
    );
    let mut first_ids = Vec::new();
    let mut generated = 0;
    while generated < count {
        let n = DEFAULT_BATCH_SIZE.min(count - generated);
        let texts: Vec<String> = (0..n).map(|_| synthetic::document(&mut rng)).collect();
        let ids = pipeline.ingest_batch(&texts).await?;
        let wanted = 5usize.saturating_sub(first_ids.len());
        first_ids.extend(ids.iter().copied().take(wanted));
        generated += n;
        if generated % (DEFAULT_BATCH_SIZE * 50) == 0 {
            info!("{} / {} documents committed", generated, count);
        }
    }
    println!("Inserted {} documents\n", generated);

    print_stats(&store, &config)?;

    println!("\nSample documents:");
    for id in first_ids {
        let record = store.get(id)?;
        let content: String = record.content().chars().take(50).collect();
        let placement = match record.placement() {
            Placement::Inline => "inline".to_string(),
            Placement::Overflow(handle) => format!("overflow, {}", handle),
        };
        println!(
            "  [{}] {}... ({} dims, {} bytes, {})",
            record.id(),
            content,
            record.dimension(),
            embedding_size(record.dimension()),
            placement
        );
    }

    store.close()?;
    Ok(())
}

fn stats(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    print_stats(&store, &config)?;
    store.close()?;
    Ok(())
}

fn print_stats(store: &Store, config: &Config) -> Result<()> {
    let stats = store.stats();

    println!("Store:      {}", data_dir(config)?.display());
    println!("Dimension:  {} ({})", store.dimension(), store.metric());
    println!("Threshold:  {} bytes", config.store.placement.threshold_bytes);
    println!(
        "Records:    {} ({} inline, {} overflow)",
        stats.records, stats.inline_records, stats.overflow_records
    );
    println!("Next id:    {}", stats.next_id);
    println!("Journal:    {} bytes", stats.journal_bytes);
    println!(
        "Overflow:   {} live bytes in {} segments",
        stats.overflow_live_bytes,
        stats.segments.len()
    );
    for segment in &stats.segments {
        println!(
            "  segment {:>4}: {:>6} slots, {:>10} live / {:>10} physical bytes",
            segment.segment_id, segment.slot_count, segment.live_bytes, segment.physical_bytes
        );
    }
    Ok(())
}

fn delete(config: Config, id: RecordId) -> Result<()> {
    let store = open_store(&config)?;
    store.delete(id).with_context(|| format!("deleting record {}", id))?;
    store.close()?;
    println!("Deleted record {}", id);
    Ok(())
}

fn checkpoint(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let generation = store.checkpoint()?;
    store.close()?;
    println!("Checkpoint {} written ({} records)", generation, store.len());
    Ok(())
}
