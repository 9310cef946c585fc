use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_etl::api::FearGreedClient;
use stock_etl::concurrent_loader::{load_tables_concurrently, ConcurrentLoadConfig};
use stock_etl::database::{setup, DatabaseManager};
use stock_etl::loader::{inspector, BulkLoader, LoadOptions};
use stock_etl::models::{Config, LoadResult, StagedTable, TableRef};
use stock_etl::staging::{fear_greed, Source, StagingNormalizer};

#[derive(Parser)]
#[command(author, version, about = "Duplicate-safe bulk loader for scraped stock data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Rows per multi-row insert (overrides BATCH_SIZE)
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing destination tables
    Setup,
    /// Stage one source file and load it
    Load {
        #[arg(value_enum)]
        source: Source,
        path: PathBuf,
    },
    /// Stage several source files and load them concurrently
    LoadAll {
        #[arg(long)]
        ownership: Option<PathBuf>,
        #[arg(long)]
        insider: Option<PathBuf>,
        #[arg(long)]
        company_info: Option<PathBuf>,
        #[arg(long)]
        snowflake: Option<PathBuf>,
        #[arg(long)]
        google_news: Option<PathBuf>,
        #[arg(long)]
        fear_greed: Option<PathBuf>,
        #[arg(long)]
        facts: Option<PathBuf>,
        /// Number of tables loaded at once (overrides LOAD_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Fetch the Fear & Greed history and load it
    FearGreed {
        /// Load a saved graphdata payload instead of calling the endpoint
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
    /// Show the current schema of a destination table
    Inspect { table: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stock_etl=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(batch_size) = cli.batch_size {
        if batch_size == 0 {
            return Err(anyhow!("--batch-size must be greater than zero"));
        }
        config.batch_size = batch_size;
    }

    match cli.command {
        Commands::Setup => run_setup(&config).await,
        Commands::Load { source, path } => run_load(&config, source, &path).await,
        Commands::LoadAll {
            ownership,
            insider,
            company_info,
            snowflake,
            google_news,
            fear_greed,
            facts,
            workers,
        } => {
            if let Some(workers) = workers {
                config.load_workers = workers.max(1);
            }
            let files: Vec<(Source, PathBuf)> = [
                (Source::Ownership, ownership),
                (Source::Insider, insider),
                (Source::CompanyInfo, company_info),
                (Source::Snowflake, snowflake),
                (Source::GoogleNews, google_news),
                (Source::FearGreed, fear_greed),
                (Source::Facts, facts),
            ]
            .into_iter()
            .filter_map(|(source, path)| path.map(|p| (source, p)))
            .collect();
            run_load_all(&config, files).await
        }
        Commands::FearGreed { from_file } => run_fear_greed(&config, from_file).await,
        Commands::Inspect { table } => run_inspect(&config, &table).await,
    }
}

async fn run_setup(config: &Config) -> Result<()> {
    let db = DatabaseManager::open(&config.database_path).await?;
    setup::ensure_destination_tables(&db).await?;
    println!("✅ {} destination tables ready in {}", setup::destination_tables().len(), db.path());
    db.close().await;
    Ok(())
}

async fn run_load(config: &Config, source: Source, path: &PathBuf) -> Result<()> {
    let (staged, _) = source.stage_file(path)?;
    load_one(config, &staged).await
}

async fn load_one(config: &Config, staged: &StagedTable) -> Result<()> {
    let db = DatabaseManager::open(&config.database_path).await?;
    let outcome = BulkLoader::new(&db, LoadOptions::from(config)).load(staged).await;
    db.close().await;

    let result = outcome.with_context(|| format!("Loading {} failed", staged.table))?;
    print_result(&result);
    Ok(())
}

async fn run_load_all(config: &Config, files: Vec<(Source, PathBuf)>) -> Result<()> {
    if files.is_empty() {
        return Err(anyhow!("No source files given; pass at least one of --ownership, --insider, --company-info, --snowflake, --google-news, --fear-greed, --facts"));
    }

    let mut jobs = Vec::with_capacity(files.len());
    for (source, path) in &files {
        let (staged, _) = source.stage_file(path)?;
        jobs.push(staged);
    }

    let database_path = config.database_path.clone();
    let outcome = load_tables_concurrently(jobs, ConcurrentLoadConfig::from(config), move || {
        let database_path = database_path.clone();
        async move { DatabaseManager::open(&database_path).await }
    })
    .await?;

    for result in outcome.results.values() {
        print_result(result);
    }
    for (table, reason) in &outcome.failures {
        error!("❌ {}: {}", table, reason);
        println!("❌ {}: {}", table, reason);
    }

    if outcome.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} of {} tables failed to load", outcome.failures.len(), files.len()))
    }
}

async fn run_fear_greed(config: &Config, from_file: Option<PathBuf>) -> Result<()> {
    let raw = match from_file {
        Some(path) => fear_greed::read_payload_file(&path)?,
        None => {
            let client = FearGreedClient::new(config)?;
            let points = client.fetch_history().await?;
            fear_greed::raw_records(&points)
        }
    };

    let (staged, report) = fear_greed::FearGreedNormalizer.normalize(&raw);
    info!("✅ Prepared {} Fear & Greed records to insert", report.staged());
    load_one(config, &staged).await
}

async fn run_inspect(config: &Config, table: &str) -> Result<()> {
    let db = DatabaseManager::open(&config.database_path).await?;
    let table = TableRef::parse(table);
    let schema = inspector::inspect(&db, &table).await?;
    db.close().await;

    if schema.is_empty() {
        warn!("Table {} does not exist", table);
        println!("⚠️ Table {} does not exist", table);
        return Ok(());
    }

    println!("📋 {}", table);
    for column in schema.values() {
        println!(
            "  {:>3}  {:<40} {:<16} {}",
            column.position, column.name, column.declared_type, column.category
        );
    }
    Ok(())
}

fn print_result(result: &LoadResult) {
    println!(
        "✔ {}: inserted={}, skipped={} ({:.2}s)",
        result.table,
        result.inserted,
        result.skipped,
        result.elapsed.as_secs_f64()
    );
}
