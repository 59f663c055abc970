use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stock_news_ingest::database::DatabaseManager;
use stock_news_ingest::models::Config;
use stock_news_ingest::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "reset_checkpoint")]
#[command(about = "Forget the stored progress of one source so its next run starts over")]
struct Cli {
    /// Source id, e.g. stock:SPY, news or sentiment
    source_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stock_news_ingest=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let database = DatabaseManager::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    let orchestrator = Orchestrator::from_config(config, database)?;

    if orchestrator.store().reset(&cli.source_id).await? {
        println!("✅ Checkpoint for {} removed", cli.source_id);
    } else {
        println!("ℹ️ No checkpoint stored for {}", cli.source_id);
    }
    Ok(())
}
