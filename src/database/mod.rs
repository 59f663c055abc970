use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{IngestCounts, NewsArticle, PendingArticle, Record, SentimentAnnotation, WeeklyBar};

/// Raw `fetch_state` row; parsing into a `Checkpoint` happens in the store
#[derive(Debug, Clone)]
pub struct FetchStateRow {
    pub source_id: String,
    pub cursor: Option<String>,
    pub period: String,
    pub offset: i64,
    pub run_count: i64,
}

/// SQLite storage for bars, articles, sentiment placeholders and fetch state
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if needed) the database and make sure the schema exists
    pub async fn new(database_path: &str) -> Result<Self> {
        let filename = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(filename)
                    .create_if_missing(true)
                    .foreign_keys(true),
            )
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.create_schema().await?;
        info!("💾 Database ready at {}", filename);
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weekly_bars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                date DATE NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                adjusted_close REAL,
                volume INTEGER,
                dividend_amount REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(ticker, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_uuid TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL,
                description TEXT,
                snippet TEXT,
                language TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(title, pub_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sentiment (
                article_id INTEGER PRIMARY KEY,
                score REAL,
                magnitude REAL,
                FOREIGN KEY(article_id) REFERENCES articles(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fetch_state (
                source_id TEXT PRIMARY KEY,
                cursor TEXT,
                period TEXT NOT NULL,
                period_offset INTEGER NOT NULL DEFAULT 0,
                run_count INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_weekly_bars_ticker_date ON weekly_bars(ticker, date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sentiment_score ON sentiment(score)")
            .execute(&self.pool)
            .await?;

        debug!("Schema verified");
        Ok(())
    }

    /// Natural keys from `records` that are already stored
    pub async fn existing_keys(&self, records: &[Record]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();

        let mut bars_by_ticker: Vec<(&str, Vec<NaiveDate>)> = Vec::new();
        let mut uuids: Vec<String> = Vec::new();
        for record in records {
            match record {
                Record::WeeklyBar(bar) => match bars_by_ticker.iter_mut().find(|(t, _)| *t == bar.ticker) {
                    Some((_, dates)) => dates.push(bar.date),
                    None => bars_by_ticker.push((bar.ticker.as_str(), vec![bar.date])),
                },
                Record::Article(article) => uuids.push(article.uuid.clone()),
            }
        }

        for (ticker, dates) in bars_by_ticker {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT date FROM weekly_bars WHERE ticker = ");
            query.push_bind(ticker.to_string());
            query.push(" AND date IN (");
            let mut separated = query.separated(", ");
            for date in dates {
                separated.push_bind(date);
            }
            separated.push_unseparated(")");

            for row in query.build().fetch_all(&self.pool).await? {
                let date: NaiveDate = row.try_get("date")?;
                existing.insert(format!("{}:{}", ticker, date));
            }
        }

        if !uuids.is_empty() {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT article_uuid FROM articles WHERE article_uuid IN (");
            let mut separated = query.separated(", ");
            for uuid in uuids {
                separated.push_bind(uuid);
            }
            separated.push_unseparated(")");

            for row in query.build().fetch_all(&self.pool).await? {
                existing.insert(row.try_get::<String, _>("article_uuid")?);
            }
        }

        Ok(existing)
    }

    /// Insert a record unless its natural key exists; true when a row was added
    pub async fn insert_record(&self, record: &Record) -> Result<bool> {
        match record {
            Record::WeeklyBar(bar) => self.insert_weekly_bar(bar).await,
            Record::Article(article) => self.insert_article_with_placeholder(article).await,
        }
    }

    pub async fn insert_weekly_bar(&self, bar: &WeeklyBar) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO weekly_bars
                (ticker, date, open, high, low, close, adjusted_close, volume, dividend_amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bar.ticker)
        .bind(bar.date)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.adjusted_close)
        .bind(bar.volume)
        .bind(bar.dividend_amount)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert an article and its empty sentiment row in one transaction
    pub async fn insert_article_with_placeholder(&self, article: &NewsArticle) -> Result<bool> {
        use chrono::Datelike;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (article_uuid, title, pub_date, year, month, day, description, snippet, language)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.uuid)
        .bind(&article.title)
        .bind(&article.published_at)
        .bind(article.published_date.year())
        .bind(article.published_date.month() as i64)
        .bind(article.published_date.day() as i64)
        .bind(&article.description)
        .bind(&article.snippet)
        .bind(&article.language)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO sentiment (article_id) VALUES (?)")
            .bind(result.last_insert_rowid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Articles whose placeholder has no score yet, oldest id first
    pub async fn pending_annotations(&self, after_id: i64, limit: usize) -> Result<Vec<PendingArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.title, a.description, a.snippet
            FROM articles a
            JOIN sentiment s ON a.id = s.article_id
            WHERE s.score IS NULL AND a.id > ?
            ORDER BY a.id
            LIMIT ?
            "#,
        )
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(PendingArticle {
                    id: r.try_get("id")?,
                    title: r.try_get("title")?,
                    description: r.try_get("description")?,
                    snippet: r.try_get("snippet")?,
                })
            })
            .collect()
    }

    pub async fn update_sentiment(&self, article_id: i64, score: f64, magnitude: f64) -> Result<()> {
        sqlx::query("UPDATE sentiment SET score = ?, magnitude = ? WHERE article_id = ?")
            .bind(score)
            .bind(magnitude)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn sentiment_for_article(&self, article_uuid: &str) -> Result<Option<SentimentAnnotation>> {
        let row = sqlx::query(
            r#"
            SELECT s.article_id, s.score, s.magnitude
            FROM sentiment s
            JOIN articles a ON a.id = s.article_id
            WHERE a.article_uuid = ?
            "#,
        )
        .bind(article_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(SentimentAnnotation {
                article_id: r.try_get("article_id")?,
                score: r.try_get("score")?,
                magnitude: r.try_get("magnitude")?,
            })
        })
        .transpose()
    }

    pub async fn count_weekly_bars(&self, ticker: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM weekly_bars WHERE ticker = ?")
            .bind(ticker)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM articles").fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    /// (scored, total) sentiment rows
    pub async fn count_sentiment(&self) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(score) AS scored, COUNT(*) AS total FROM sentiment",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("scored")?, row.try_get("total")?))
    }

    /// Counts printed before and after a run
    pub async fn get_counts(&self, tickers: &[String]) -> Result<IngestCounts> {
        let mut counts = IngestCounts::default();
        for ticker in tickers {
            counts.stock.insert(ticker.clone(), self.count_weekly_bars(ticker).await?);
        }
        counts.news = self.count_articles().await?;
        let (scored, total) = self.count_sentiment().await?;
        counts.sentiment_scored = scored;
        counts.sentiment_total = total;
        Ok(counts)
    }

    pub async fn get_fetch_state(&self, source_id: &str) -> Result<Option<FetchStateRow>> {
        let row = sqlx::query(
            "SELECT source_id, cursor, period, period_offset, run_count FROM fetch_state WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(FetchStateRow {
                source_id: r.try_get("source_id")?,
                cursor: r.try_get("cursor")?,
                period: r.try_get("period")?,
                offset: r.try_get("period_offset")?,
                run_count: r.try_get("run_count")?,
            })
        })
        .transpose()
    }

    pub async fn put_fetch_state(&self, state: &FetchStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fetch_state (source_id, cursor, period, period_offset, run_count, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                cursor = excluded.cursor,
                period = excluded.period,
                period_offset = excluded.period_offset,
                run_count = excluded.run_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.source_id)
        .bind(&state.cursor)
        .bind(&state.period)
        .bind(state.offset)
        .bind(state.run_count)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_fetch_state(&self, source_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM fetch_state WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
