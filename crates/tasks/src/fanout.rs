//! One pipeline per observation of a tile
//!
//! Daily products (WOFLs) are written per acquisition. Each observation
//! runs through its own pipeline whose search yields exactly that item, so
//! one bad scene never sinks the rest of the tile. Failures land in a
//! dead-letter object next to the ledger and the tile gets a single ledger
//! record for the whole batch.

use tracing::{debug, error, info, warn};
use wofs_cloud::ObjectStore;
use wofs_core::Observation;
use wofs_grid::Tile;

use crate::error::{Result, TaskError};
use crate::item_path::ItemPath;
use crate::ledger::Ledger;
use crate::pipeline::{record_outcome, Stages, TaskOutcome, TilePipeline};
use crate::searchers::ItemSearcher;
use crate::stages::{Loader, PostProcessor, Processor, Searcher, Writer};

/// What happened to each observation of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Paths written by the observations that completed
    pub written: Vec<String>,
    /// Observations whose sidecar already existed
    pub existing: Vec<String>,
    /// Observations that failed
    pub failed: Vec<String>,
    /// Failed observations whose dead letter could not be stored, with the
    /// store error
    pub undelivered: Vec<String>,
}

impl FanOutReport {
    /// True when nothing succeeded or already existed
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.written.is_empty() && self.existing.is_empty()
    }
}

/// The per-observation stages shared by every item of one tile
pub struct MultiItemTask<'a> {
    pub tile: &'a Tile,
    /// Base path; each observation writes under its own acquisition date
    pub item_path: &'a ItemPath,
    pub loader: &'a dyn Loader,
    pub processor: &'a mut dyn Processor,
    pub post_processor: &'a dyn PostProcessor,
    pub writer: &'a dyn Writer,
    pub store: &'a dyn ObjectStore,
}

impl MultiItemTask<'_> {
    fn run_item(&mut self, observation: &Observation, item_path: &ItemPath) -> Result<TaskOutcome> {
        let searcher = ItemSearcher::new(observation.clone());
        let stages = Stages {
            searcher: &searcher,
            loader: self.loader,
            processor: &mut *self.processor,
            post_processor: self.post_processor,
            writer: self.writer,
        };
        TilePipeline::new(self.tile, item_path, stages).run()
    }

    fn dead_letter(&self, observation: &Observation, error: &TaskError) -> Result<()> {
        let key = self.item_path.dead_letter_path(&self.tile.key, &observation.id);
        let payload = format!(
            "tile: {}\nobservation: {}\ndatetime: {}\nerror: {error}\n",
            self.tile.key,
            observation.id,
            observation.datetime.to_rfc3339()
        );
        self.store.put(&key, payload.as_bytes())?;
        Ok(())
    }

    /// Process every observation that has no output yet.
    pub fn run(&mut self, observations: &[Observation]) -> FanOutReport {
        let mut report = FanOutReport::default();
        for observation in observations {
            let item_path = self.item_path.with_date(observation.datetime.date_naive());
            let marker = item_path.stac_path(&self.tile.key);

            let result = match self.store.exists(&marker) {
                Ok(true) => {
                    debug!("{}: {marker} exists, skipping", observation.id);
                    report.existing.push(observation.id.clone());
                    continue;
                }
                Ok(false) => self.run_item(observation, &item_path),
                Err(e) => Err(TaskError::from(e)),
            };

            match result {
                Ok(TaskOutcome::Completed { paths }) => report.written.extend(paths),
                Ok(TaskOutcome::Skipped { reason }) => {
                    debug!("{}: {reason}", observation.id);
                }
                Err(e) => {
                    warn!("Tile {}: observation {} failed: {e}", self.tile.key, observation.id);
                    if let Err(lost) = self.dead_letter(observation, &e) {
                        error!("Tile {}: dead letter for {} not written: {lost}", self.tile.key, observation.id);
                        report.undelivered.push(format!("{}: {lost}", observation.id));
                    }
                    report.failed.push(observation.id.clone());
                }
            }
        }
        info!(
            "Tile {}: {} paths written, {} observations already present, {} failed",
            self.tile.key,
            report.written.len(),
            report.existing.len(),
            report.failed.len()
        );
        report
    }
}

/// Search a tile, fan out over what was found and append one ledger record.
///
/// The tile fails when every observation failed, or when a failure could
/// not be dead-lettered.
pub fn run_multi_item_tile(
    ledger: &Ledger,
    searcher: &dyn Searcher,
    task: &mut MultiItemTask<'_>,
) -> Result<TaskOutcome> {
    let tile = task.tile;
    let result = match searcher.search(tile) {
        Ok(found) if found.is_empty() => Ok(TaskOutcome::Skipped {
            reason: format!("no items found for tile {}", tile.key),
        }),
        Ok(found) => {
            let report = task.run(&found);
            if report.all_failed() {
                Err(TaskError::FanOut {
                    tile: tile.key.to_string(),
                    failed: report.failed,
                })
            } else if !report.undelivered.is_empty() {
                Err(TaskError::DeadLetter {
                    tile: tile.key.to_string(),
                    undelivered: report.undelivered,
                })
            } else {
                Ok(TaskOutcome::Completed { paths: report.written })
            }
        }
        Err(e) if e.is_empty_collection() => Ok(TaskOutcome::Skipped { reason: e.to_string() }),
        Err(e) => Err(e),
    };
    record_outcome(ledger, tile, result)
}
