//! Common test utilities and helpers

pub mod database;
pub mod scripted_source;

pub use database::TestDatabase;
pub use scripted_source::{Failure, ScriptedSource};

/// Test data utilities
pub mod test_data {
    use chrono::NaiveDate;
    use stock_news_ingest::models::{Checkpoint, Config, NewsArticle, Period, Record};

    pub fn period(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    /// `count` distinct articles published inside `period`, keyed `YYYY-MM-i`
    pub fn articles_for(period: Period, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let day = 1 + (i as u32 % 28);
                Record::Article(NewsArticle {
                    uuid: format!("{}-{}", period, i),
                    title: format!("Markets story {} of {}", i, period),
                    published_at: format!("{}-{:02}T12:00:00Z", period, day),
                    published_date: NaiveDate::from_ymd_opt(period.year, period.month, day).unwrap(),
                    description: Some("Stocks rally on strong earnings".to_string()),
                    snippet: None,
                    language: "en".to_string(),
                })
            })
            .collect()
    }

    /// A checkpoint that has already spent `run_count` runs
    pub fn checkpoint_at(source_id: &str, period: Period, run_count: u32) -> Checkpoint {
        Checkpoint { run_count, ..Checkpoint::initial(source_id, period) }
    }

    /// Configuration with tiny defaults and no network endpoints
    pub fn test_config(database_path: &str) -> Config {
        Config {
            database_path: database_path.to_string(),
            checkpoint_dir: None,
            stock_tickers: vec!["SPY".to_string()],
            stock_api_key_path: "api_key_stocks.txt".to_string(),
            news_api_key_path: "api_key_news.txt".to_string(),
            alpha_vantage_base_url: "http://127.0.0.1:9".to_string(),
            news_api_base_url: "http://127.0.0.1:9".to_string(),
            max_items_per_run: 25,
            max_fetches_per_run: 100,
            stock_initial_runs: 3,
            news_initial_runs: 4,
            sentiment_initial_runs: 4,
            stock_start: period(2021, 1),
            stock_end: period(2021, 12),
            news_start: period(2021, 1),
            news_end: period(2021, 12),
            stock_page_size: 25,
            news_page_size: 3,
            alpha_vantage_rate_limit_per_minute: 600,
            news_rate_limit_per_minute: 600,
        }
    }
}

/// Logging utilities for tests
pub mod logging {
    use tracing::{debug, info};

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    /// Log test data
    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}
