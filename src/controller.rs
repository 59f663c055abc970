//! Resume-across-runs state machine driving one source per call.
//!
//! A source starts in `Initial`: each run fetches exactly one period and moves
//! the pointer forward by one period. After `initial_runs` runs it is
//! `Steady` and walks consecutive periods until the item budget, the fetch
//! ceiling or the end boundary stops it. Once the pointer passes the end
//! boundary the source is `Done` and runs become no-ops.

use std::fmt;
use tracing::{debug, info};

use crate::api::{FetchRequest, RecordSource};
use crate::checkpoint::CheckpointStore;
use crate::error::{IngestError, Result};
use crate::models::{Checkpoint, Period};
use crate::writer::DedupWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Initial,
    Steady,
    Done,
}

impl ControllerState {
    /// State implied by a checkpoint; `end` of None never finishes
    pub fn classify(checkpoint: &Checkpoint, initial_runs: u32, end: Option<Period>) -> Self {
        if end.is_some_and(|end| checkpoint.period > end) {
            ControllerState::Done
        } else if checkpoint.run_count < initial_runs {
            ControllerState::Initial
        } else {
            ControllerState::Steady
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Initial => "INITIAL",
            ControllerState::Steady => "STEADY",
            ControllerState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Per-source limits
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// First period fetched on a fresh checkpoint
    pub start: Period,
    /// Last period fetched; the source is done once the pointer is past it
    pub end: Period,
    /// Runs spent in the one-period-per-run phase
    pub initial_runs: u32,
    /// New records allowed per run
    pub max_items: usize,
    /// Records requested per fetch
    pub page_size: usize,
    /// Fetches allowed per steady run
    pub max_fetches_per_run: usize,
}

/// What one run did for one source
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source_id: String,
    pub state_before: ControllerState,
    pub state_after: ControllerState,
    pub fetches: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub checkpoint: Checkpoint,
}

pub struct ProgressController {
    settings: ControllerSettings,
}

impl ProgressController {
    pub fn new(settings: ControllerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn state_of(&self, checkpoint: &Checkpoint) -> ControllerState {
        ControllerState::classify(checkpoint, self.settings.initial_runs, Some(self.settings.end))
    }

    /// Load the checkpoint, advance it by one run and save it.
    ///
    /// Any error leaves the stored checkpoint exactly as it was.
    pub async fn run_once(
        &self,
        source: &dyn RecordSource,
        store: &dyn CheckpointStore,
        writer: &DedupWriter,
    ) -> Result<RunReport> {
        let source_id = source.source_id();
        let checkpoint = store.load(&source_id, self.settings.start).await?;
        let report = self.advance(source, writer, checkpoint).await?;

        if report.state_before != ControllerState::Done {
            store.save(&report.checkpoint).await?;
        }
        Ok(report)
    }

    /// Run one iteration of the state machine from `checkpoint`
    pub async fn advance(
        &self,
        source: &dyn RecordSource,
        writer: &DedupWriter,
        checkpoint: Checkpoint,
    ) -> Result<RunReport> {
        let state_before = self.state_of(&checkpoint);
        let mut next = checkpoint;
        let mut fetches = 0;
        let mut inserted = 0;
        let mut duplicates = 0;

        info!(
            "🔄 {}: {} run #{} at {} (offset {})",
            next.source_id,
            state_before,
            next.run_count + 1,
            next.period,
            next.offset
        );

        match state_before {
            ControllerState::Done => {
                debug!("{} is past {}, nothing to fetch", next.source_id, self.settings.end);
            }
            ControllerState::Initial => {
                let request = self.request_at(&next);
                let page = source.fetch_page(&request).await?;
                fetches += 1;

                let summary = writer.write(&page.records, self.settings.max_items).await?;
                inserted += summary.inserted;
                duplicates += summary.duplicates;
                if summary.last_key.is_some() {
                    next.cursor = summary.last_key;
                }

                next.period = next.period.next();
                next.offset = 0;
                next.run_count += 1;
            }
            ControllerState::Steady => {
                while inserted < self.settings.max_items
                    && fetches < self.settings.max_fetches_per_run
                    && next.period <= self.settings.end
                {
                    let request = self.request_at(&next);
                    let page = source.fetch_page(&request).await?;
                    fetches += 1;

                    let remaining = self.settings.max_items - inserted;
                    let summary = writer.write(&page.records, remaining).await?;
                    inserted += summary.inserted;
                    duplicates += summary.duplicates;
                    if summary.last_key.is_some() {
                        next.cursor = summary.last_key.clone();
                    }

                    if !summary.consumed_all(page.records.len()) {
                        // Budget ran out mid-page; resume at the same position next run
                        break;
                    }

                    if page.is_exhausted(request.limit) {
                        debug!("{} exhausted at {}", next.source_id, next.period);
                        next.period = next.period.next();
                        next.offset = 0;
                    } else {
                        next.offset = advance_offset(next.offset, page.upstream_len)?;
                    }
                }
                next.run_count += 1;
            }
        }

        let state_after = self.state_of(&next);
        info!(
            "📊 {}: +{} records over {} fetches, next position {} (offset {}), state {}",
            next.source_id,
            inserted,
            fetches,
            next.period,
            next.offset,
            state_after
        );

        Ok(RunReport {
            source_id: next.source_id.clone(),
            state_before,
            state_after,
            fetches,
            inserted,
            duplicates,
            checkpoint: next,
        })
    }

    fn request_at(&self, checkpoint: &Checkpoint) -> FetchRequest {
        FetchRequest {
            period: checkpoint.period,
            offset: checkpoint.offset,
            limit: self.settings.page_size,
        }
    }
}

/// Offset after consuming a full page of `upstream_len` items
fn advance_offset(offset: u32, upstream_len: usize) -> Result<u32> {
    u32::try_from(upstream_len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or_else(|| IngestError::DataIntegrity(format!("offset {} + {} overflows", offset, upstream_len)))
}
