//! Durable per-source ingestion progress.
//!
//! Two backends share the `CheckpointStore` trait: a `fetch_state` table in the
//! ingestion database, and one JSON file per source in a directory. Either way
//! unreadable state is logged and replaced by the default checkpoint so a bad
//! write never blocks later runs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::database::{DatabaseManager, FetchStateRow};
use crate::error::Result;
use crate::models::{Checkpoint, Period};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored checkpoint, or a fresh one starting at `initial_period`
    async fn load(&self, source_id: &str, initial_period: Period) -> Result<Checkpoint>;

    /// Replace the stored checkpoint
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Forget a checkpoint; true when one existed
    async fn reset(&self, source_id: &str) -> Result<bool>;
}

/// Checkpoints kept in the `fetch_state` table
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    database: DatabaseManager,
}

impl SqliteCheckpointStore {
    pub fn new(database: DatabaseManager) -> Self {
        Self { database }
    }
}

fn checkpoint_from_row(row: FetchStateRow) -> Option<Checkpoint> {
    let period: Period = row.period.parse().ok()?;
    Some(Checkpoint {
        source_id: row.source_id,
        cursor: row.cursor,
        period,
        offset: u32::try_from(row.offset).ok()?,
        run_count: u32::try_from(row.run_count).ok()?,
    })
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, source_id: &str, initial_period: Period) -> Result<Checkpoint> {
        let row = match self.database.get_fetch_state(source_id).await {
            Ok(row) => row,
            Err(e) => {
                warn!("⚠️ Unreadable checkpoint for {}: {}; starting from {}", source_id, e, initial_period);
                return Ok(Checkpoint::initial(source_id, initial_period));
            }
        };

        match row {
            Some(row) => match checkpoint_from_row(row) {
                Some(checkpoint) => Ok(checkpoint),
                None => {
                    warn!("⚠️ Corrupt checkpoint for {}; starting from {}", source_id, initial_period);
                    Ok(Checkpoint::initial(source_id, initial_period))
                }
            },
            None => {
                debug!("No checkpoint for {}, starting at {}", source_id, initial_period);
                Ok(Checkpoint::initial(source_id, initial_period))
            }
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.database
            .put_fetch_state(&FetchStateRow {
                source_id: checkpoint.source_id.clone(),
                cursor: checkpoint.cursor.clone(),
                period: checkpoint.period.to_string(),
                offset: i64::from(checkpoint.offset),
                run_count: i64::from(checkpoint.run_count),
            })
            .await
    }

    async fn reset(&self, source_id: &str) -> Result<bool> {
        let existed = self.database.delete_fetch_state(source_id).await?;
        if existed {
            info!("🗑️ Reset checkpoint for {}", source_id);
        }
        Ok(existed)
    }
}

/// One `<source>_progress.json` file per source
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, source_id: &str) -> PathBuf {
        let file_stem: String = source_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}_progress.json", file_stem))
    }

    fn read(path: &Path) -> Option<Checkpoint> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self, source_id: &str, initial_period: Period) -> Result<Checkpoint> {
        let path = self.path_for(source_id);
        if !path.exists() {
            return Ok(Checkpoint::initial(source_id, initial_period));
        }

        match Self::read(&path) {
            Some(checkpoint) if checkpoint.source_id == source_id => Ok(checkpoint),
            _ => {
                warn!(
                    "⚠️ Corrupt checkpoint file {}; starting {} from {}",
                    path.display(),
                    source_id,
                    initial_period
                );
                Ok(Checkpoint::initial(source_id, initial_period))
            }
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.source_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn reset(&self, source_id: &str) -> Result<bool> {
        let path = self.path_for(source_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        info!("🗑️ Reset checkpoint for {}", source_id);
        Ok(true)
    }
}
