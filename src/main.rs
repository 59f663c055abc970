use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use stock_news_ingest::database::DatabaseManager;
use stock_news_ingest::models::Config;
use stock_news_ingest::orchestrator::{resolve_credentials, IngestSources, Orchestrator};
use stock_news_ingest::sentiment::LexiconScorer;

#[derive(Parser)]
#[command(name = "stock-news-ingest")]
#[command(about = "Incrementally ingest weekly stock bars and news, then score article sentiment")]
struct Cli {
    /// Print current row counts and exit
    #[arg(long)]
    status: bool,

    /// Override the per-source cap on new records for this run
    #[arg(long)]
    max_items: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stock_news_ingest=info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("Run failed: {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(max_items) = cli.max_items {
        anyhow::ensure!(max_items > 0, "--max-items must be positive");
        config.max_items_per_run = max_items;
    }

    let database = DatabaseManager::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    let orchestrator = Orchestrator::from_config(config.clone(), database)?;

    if cli.status {
        let counts = orchestrator.counts().await?;
        for (ticker, bars) in &counts.stock {
            println!("📈 {:<6} weekly bars: {}", ticker, bars);
        }
        println!("📰 news articles:      {}", counts.news);
        println!("🧠 sentiment scored:   {}/{}", counts.sentiment_scored, counts.sentiment_total);
        return Ok(());
    }

    let (stock_key, news_token) = resolve_credentials(&config).context("Missing API credentials")?;
    let sources = IngestSources::from_config(&config, &stock_key, &news_token)?;

    println!("🚀 Starting ingestion run");
    let summary = orchestrator.run(&sources, LexiconScorer::new()).await?;
    println!("{}", summary.render());
    Ok(())
}
