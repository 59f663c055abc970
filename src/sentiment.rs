use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::controller::ControllerState;
use crate::database::DatabaseManager;
use crate::error::{IngestError, Result};
use crate::models::Period;

pub const SENTIMENT_SOURCE_ID: &str = "sentiment";

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Document-level sentiment: `score` in [-1, 1], `magnitude` >= 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentiment {
    pub score: f64,
    pub magnitude: f64,
}

#[cfg_attr(test, mockall::automock)]
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<Sentiment>;
}

/// Lexicon scorer with a three-token negation window
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    fn word_score(&self, word: &str) -> i32 {
        *LEXICON.get(word).unwrap_or(&0)
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<Sentiment> {
        let tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            return Err(IngestError::DataIntegrity("no text to score".to_string()));
        }

        let mut total = 0i32;
        let mut strength = 0i32;
        for (i, token) in tokens.iter().enumerate() {
            let base = self.word_score(token);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
            total += if negated { -base } else { base };
            strength += base.abs();
        }

        let total = f64::from(total);
        Ok(Sentiment {
            score: total / (total * total + 15.0).sqrt(),
            magnitude: f64::from(strength) / 3.0,
        })
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(token: &str) -> bool {
    matches!(
        token,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot" | "without"
    )
}

#[derive(Debug, Clone)]
pub struct AnnotationSettings {
    pub initial_runs: u32,
    /// Articles per batch
    pub batch_size: usize,
    /// Batches allowed per steady run
    pub max_batches_per_run: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationReport {
    pub state_before: ControllerState,
    pub annotated: usize,
    /// Articles with nothing scoreable; skipped for good
    pub dropped: usize,
    /// Transient scoring failures; retried next run
    pub failed: usize,
    pub batches: usize,
    pub cursor: i64,
}

/// Fills empty sentiment rows in cursor-ordered batches
pub struct AnnotationPass<S: SentimentScorer> {
    settings: AnnotationSettings,
    scorer: S,
}

impl<S: SentimentScorer> AnnotationPass<S> {
    pub fn new(settings: AnnotationSettings, scorer: S) -> Self {
        Self { settings, scorer }
    }

    /// Annotate the next batch(es) and persist the cursor.
    ///
    /// `DataIntegrity` from the scorer drops the article. Any other scoring
    /// failure holds the persisted cursor before that article so the next run
    /// retries it, while this run keeps scanning past it.
    pub async fn run_once(&self, database: &DatabaseManager, store: &dyn CheckpointStore) -> Result<AnnotationReport> {
        // The period pointer is unused here; any fixed value will do
        let mut checkpoint = store.load(SENTIMENT_SOURCE_ID, Period { year: 1970, month: 1 }).await?;
        let state_before = ControllerState::classify(&checkpoint, self.settings.initial_runs, None);

        let mut cursor = match checkpoint.cursor.as_deref().map(str::parse::<i64>) {
            None => 0,
            Some(Ok(id)) => id,
            Some(Err(_)) => {
                warn!("⚠️ Unreadable sentiment cursor {:?}; restarting from the first article", checkpoint.cursor);
                0
            }
        };

        let allowed_batches = match state_before {
            ControllerState::Initial => 1,
            _ => self.settings.max_batches_per_run,
        };

        let mut report = AnnotationReport {
            state_before,
            annotated: 0,
            dropped: 0,
            failed: 0,
            batches: 0,
            cursor,
        };

        let mut scanned_to = cursor;
        let mut held = false;
        while report.batches < allowed_batches {
            let pending = database.pending_annotations(scanned_to, self.settings.batch_size).await?;
            report.batches += 1;
            if pending.is_empty() {
                break;
            }

            for article in &pending {
                scanned_to = article.id;
                match self.scorer.score(&article.analysis_text()) {
                    Ok(sentiment) => {
                        database.update_sentiment(article.id, sentiment.score, sentiment.magnitude).await?;
                        report.annotated += 1;
                    }
                    Err(IngestError::DataIntegrity(reason)) => {
                        warn!("⚠️ Dropping article {} from sentiment: {}", article.id, reason);
                        report.dropped += 1;
                    }
                    Err(e) => {
                        warn!("⚠️ Could not score article {}: {}", article.id, e);
                        report.failed += 1;
                        held = true;
                    }
                }
                if !held {
                    cursor = article.id;
                }
            }

            if pending.len() < self.settings.batch_size {
                break;
            }
        }

        report.cursor = cursor;
        if cursor > 0 {
            checkpoint.cursor = Some(cursor.to_string());
        }
        checkpoint.run_count += 1;
        store.save(&checkpoint).await?;

        info!(
            "🧠 Sentiment ({}): {} annotated, {} dropped, {} failed over {} batches",
            state_before, report.annotated, report.dropped, report.failed, report.batches
        );
        Ok(report)
    }
}
