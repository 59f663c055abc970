use thiserror::Error;

/// Errors raised while ingesting records.
///
/// The variants map onto what a run does next: `Auth` stops the whole run,
/// `UpstreamUnavailable` and the infrastructure variants abort only the
/// current source (its checkpoint is left alone), and `DataIntegrity` drops a
/// single fetched item.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("data integrity problem: {0}")]
    DataIntegrity(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// True when the error must stop the run for every source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Auth(_) | IngestError::Config(_))
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        // Transport failures are retried by the next scheduled run.
        IngestError::UpstreamUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
