use tracing::{debug, info};

use crate::database::DatabaseManager;
use crate::error::Result;
use crate::models::Record;

/// Outcome of writing one fetched page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: usize,
    pub duplicates: usize,
    /// Records of the page that were looked at before the cap stopped the write
    pub examined: usize,
    /// Natural key of the last record inserted
    pub last_key: Option<String>,
}

impl WriteSummary {
    /// True when every record of a page of `page_len` was looked at
    pub fn consumed_all(&self, page_len: usize) -> bool {
        self.examined >= page_len
    }
}

/// Inserts only records whose natural key is not stored yet
#[derive(Clone)]
pub struct DedupWriter {
    database: DatabaseManager,
}

impl DedupWriter {
    pub fn new(database: DatabaseManager) -> Self {
        Self { database }
    }

    /// Insert up to `max_items` new records; duplicates do not count against the cap.
    ///
    /// Every record is committed on its own, articles together with their empty
    /// sentiment row.
    pub async fn write(&self, records: &[Record], max_items: usize) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        if records.is_empty() || max_items == 0 {
            return Ok(summary);
        }

        let existing = self.database.existing_keys(records).await?;

        for record in records {
            if summary.inserted >= max_items {
                break;
            }
            summary.examined += 1;

            let key = record.natural_key();
            if existing.contains(&key) {
                summary.duplicates += 1;
                continue;
            }

            if self.database.insert_record(record).await? {
                summary.inserted += 1;
                summary.last_key = Some(key);
            } else {
                // Secondary unique key, e.g. the same headline under a new uuid
                debug!("Skipped duplicate {}", key);
                summary.duplicates += 1;
            }
        }

        info!(
            "✅ Inserted {} new records ({} duplicates skipped, {} of {} examined)",
            summary.inserted,
            summary.duplicates,
            summary.examined,
            records.len()
        );
        Ok(summary)
    }
}
