//! One scheduled run across every configured source.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{AlphaVantageClient, ApiRateLimiter, NewsApiClient, RecordSource};
use crate::checkpoint::{CheckpointStore, JsonFileCheckpointStore, SqliteCheckpointStore};
use crate::controller::{ControllerSettings, ProgressController, RunReport};
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::models::{Config, IngestCounts};
use crate::sentiment::{AnnotationPass, AnnotationReport, AnnotationSettings, SentimentScorer};
use crate::writer::DedupWriter;

/// Upstream sources for one run
pub struct IngestSources {
    pub stocks: Vec<Box<dyn RecordSource>>,
    pub news: Option<Box<dyn RecordSource>>,
}

impl IngestSources {
    /// One Alpha Vantage source per ticker sharing a throttle, plus the news source
    pub fn from_config(config: &Config, stock_api_key: &str, news_api_token: &str) -> Result<Self> {
        let stock_limiter = Arc::new(ApiRateLimiter::new(config.alpha_vantage_rate_limit_per_minute));

        let mut stocks: Vec<Box<dyn RecordSource>> = Vec::with_capacity(config.stock_tickers.len());
        for ticker in &config.stock_tickers {
            let client =
                AlphaVantageClient::from_config(config, stock_api_key.to_string(), ticker, Arc::clone(&stock_limiter))?;
            stocks.push(Box::new(client));
        }

        let news = NewsApiClient::from_config(config, news_api_token.to_string())?;
        Ok(Self {
            stocks,
            news: Some(Box::new(news)),
        })
    }
}

/// Result of one source within a run
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Completed(RunReport),
    Failed { source_id: String, error: String },
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub before: IngestCounts,
    pub after: IngestCounts,
    pub sources: Vec<SourceOutcome>,
    pub sentiment: Option<AnnotationReport>,
    pub sentiment_error: Option<String>,
}

impl RunSummary {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter_map(|outcome| match outcome {
                SourceOutcome::Failed { source_id, .. } => Some(source_id.as_str()),
                SourceOutcome::Completed(_) => None,
            })
            .collect()
    }

    /// Human readable before/after table
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for (ticker, after) in &self.after.stock {
            let before = self.before.stock.get(ticker).copied().unwrap_or(0);
            lines.push(format!("📈 {:<6} weekly bars: {} -> {}", ticker, before, after));
        }
        lines.push(format!("📰 news articles:      {} -> {}", self.before.news, self.after.news));
        lines.push(format!(
            "🧠 sentiment scored:   {}/{} -> {}/{}",
            self.before.sentiment_scored,
            self.before.sentiment_total,
            self.after.sentiment_scored,
            self.after.sentiment_total
        ));
        for outcome in &self.sources {
            if let SourceOutcome::Failed { source_id, error } = outcome {
                lines.push(format!("❌ {} failed: {}", source_id, error));
            }
        }
        if let Some(error) = &self.sentiment_error {
            lines.push(format!("❌ sentiment failed: {}", error));
        }
        lines.join("\n")
    }
}

pub struct Orchestrator {
    config: Config,
    database: DatabaseManager,
    store: Box<dyn CheckpointStore>,
}

impl Orchestrator {
    pub fn new(config: Config, database: DatabaseManager, store: Box<dyn CheckpointStore>) -> Self {
        Self { config, database, store }
    }

    /// Checkpoints go to `CHECKPOINT_DIR` when set, the database otherwise
    pub fn from_config(config: Config, database: DatabaseManager) -> Result<Self> {
        let store: Box<dyn CheckpointStore> = match &config.checkpoint_dir {
            Some(dir) => {
                info!("🗂️ Using JSON checkpoints in {}", dir.display());
                Box::new(JsonFileCheckpointStore::new(dir)?)
            }
            None => Box::new(SqliteCheckpointStore::new(database.clone())),
        };
        Ok(Self::new(config, database, store))
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    pub fn stock_settings(&self) -> ControllerSettings {
        ControllerSettings {
            start: self.config.stock_start,
            end: self.config.stock_end,
            initial_runs: self.config.stock_initial_runs,
            max_items: self.config.max_items_per_run,
            page_size: self.config.stock_page_size,
            max_fetches_per_run: self.config.max_fetches_per_run,
        }
    }

    pub fn news_settings(&self) -> ControllerSettings {
        ControllerSettings {
            start: self.config.news_start,
            end: self.config.news_end,
            initial_runs: self.config.news_initial_runs,
            max_items: self.config.max_items_per_run,
            page_size: self.config.news_page_size,
            max_fetches_per_run: self.config.max_fetches_per_run,
        }
    }

    pub fn annotation_settings(&self) -> AnnotationSettings {
        AnnotationSettings {
            initial_runs: self.config.sentiment_initial_runs,
            batch_size: self.config.max_items_per_run,
            max_batches_per_run: self.config.max_fetches_per_run,
        }
    }

    pub async fn counts(&self) -> Result<IngestCounts> {
        self.database.get_counts(&self.config.stock_tickers).await
    }

    /// Run every source once, then annotate new articles.
    ///
    /// A failing source is reported and skipped; `Auth` and `Config` errors
    /// stop the whole run.
    pub async fn run<S: SentimentScorer>(&self, sources: &IngestSources, scorer: S) -> Result<RunSummary> {
        let before = self.counts().await?;
        let writer = DedupWriter::new(self.database.clone());
        let mut outcomes = Vec::new();

        let stock_controller = ProgressController::new(self.stock_settings());
        for source in &sources.stocks {
            outcomes.push(self.run_source(&stock_controller, source.as_ref(), &writer).await?);
        }

        if let Some(news) = &sources.news {
            let news_controller = ProgressController::new(self.news_settings());
            outcomes.push(self.run_source(&news_controller, news.as_ref(), &writer).await?);
        }

        let pass = AnnotationPass::new(self.annotation_settings(), scorer);
        let (sentiment, sentiment_error) = match pass.run_once(&self.database, self.store()).await {
            Ok(report) => (Some(report), None),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("❌ Sentiment pass failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let after = self.counts().await?;
        let summary = RunSummary {
            before,
            after,
            sources: outcomes,
            sentiment,
            sentiment_error,
        };

        let failed = summary.failed_sources();
        if failed.is_empty() {
            info!("🎉 Run complete");
        } else {
            warn!("⚠️ Run complete with failures: {}", failed.join(", "));
        }
        Ok(summary)
    }

    async fn run_source(
        &self,
        controller: &ProgressController,
        source: &dyn RecordSource,
        writer: &DedupWriter,
    ) -> Result<SourceOutcome> {
        match controller.run_once(source, self.store(), writer).await {
            Ok(report) => Ok(SourceOutcome::Completed(report)),
            Err(e) if e.is_fatal() => {
                error!("🛑 {} aborted the run: {}", source.source_id(), e);
                Err(e)
            }
            Err(e) => {
                error!("❌ {} failed, checkpoint kept: {}", source.source_id(), e);
                Ok(SourceOutcome::Failed {
                    source_id: source.source_id(),
                    error: e.to_string(),
                })
            }
        }
    }
}

/// Credentials for both upstreams; either missing is fatal
pub fn resolve_credentials(config: &Config) -> Result<(String, String)> {
    let stock_key = crate::api::resolve_api_key("ALPHA_VANTAGE_API_KEY", &config.stock_api_key_path)?;
    let news_token = crate::api::resolve_api_key("NEWS_API_TOKEN", &config.news_api_key_path)?;
    Ok((stock_key, news_token))
}
