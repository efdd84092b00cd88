//! Single-tile task pipeline
//!
//! ```text
//! Pending -> Searching -> Loading -> Processing -> PostProcessing -> Writing -> Completed
//!                |
//!                +-> Skipped (nothing found)      any stage error -> Failed
//! ```
//!
//! [`run_tile`] wraps a pipeline with the ledger: every terminal outcome is
//! appended before the caller sees it.

use std::fmt;

use tracing::{debug, error, info, warn};
use wofs_grid::Tile;

use crate::error::{Result, TaskError};
use crate::item_path::ItemPath;
use crate::ledger::{Ledger, LedgerRecord, Status};
use crate::stages::{Loader, PostProcessor, Processor, Searcher, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Searching,
    Loading,
    Processing,
    PostProcessing,
    Writing,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a pipeline that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { paths: Vec<String> },
    Skipped { reason: String },
}

/// The stages one pipeline runs through
pub struct Stages<'a> {
    pub searcher: &'a dyn Searcher,
    pub loader: &'a dyn Loader,
    pub processor: &'a mut dyn Processor,
    pub post_processor: &'a dyn PostProcessor,
    pub writer: &'a dyn Writer,
}

pub struct TilePipeline<'a> {
    tile: &'a Tile,
    item_path: &'a ItemPath,
    stages: Stages<'a>,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl<'a> TilePipeline<'a> {
    pub fn new(tile: &'a Tile, item_path: &'a ItemPath, stages: Stages<'a>) -> Self {
        Self {
            tile,
            item_path,
            stages,
            state: PipelineState::Pending,
            history: vec![PipelineState::Pending],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn enter(&mut self, next: PipelineState) {
        debug!("Tile {}: {} -> {}", self.tile.key, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run every stage once. No stage is retried.
    pub fn run(&mut self) -> Result<TaskOutcome> {
        let result = self.run_stages();
        match &result {
            Ok(TaskOutcome::Completed { .. }) => self.enter(PipelineState::Completed),
            Ok(TaskOutcome::Skipped { .. }) => self.enter(PipelineState::Skipped),
            Err(_) => self.enter(PipelineState::Failed),
        }
        result
    }

    fn run_stages(&mut self) -> Result<TaskOutcome> {
        self.enter(PipelineState::Searching);
        let observations = match self.stages.searcher.search(self.tile) {
            Ok(found) if found.is_empty() => {
                return Ok(TaskOutcome::Skipped {
                    reason: format!("no items found for tile {}", self.tile.key),
                })
            }
            Ok(found) => found,
            Err(e) if e.is_empty_collection() => {
                return Ok(TaskOutcome::Skipped { reason: e.to_string() })
            }
            Err(e) => return Err(e),
        };
        debug!("Tile {}: {} observations", self.tile.key, observations.len());

        // Bands are read lazily, so load errors surface while processing.
        self.enter(PipelineState::Loading);
        let (tile, loader) = (self.tile, self.stages.loader);
        let bands = loader.load(&observations, &tile.geobox);

        self.enter(PipelineState::Processing);
        let dataset = self.stages.processor.process(bands, tile)?;

        self.enter(PipelineState::PostProcessing);
        let dataset = self.stages.post_processor.post_process(dataset, &observations)?;

        self.enter(PipelineState::Writing);
        let paths = self.stages.writer.write(&dataset, self.tile, self.item_path)?;
        Ok(TaskOutcome::Completed { paths })
    }
}

/// Append the outcome of `result` for `tile` to the ledger, then hand the
/// result back. Failures are recorded before they are returned.
pub fn record_outcome(ledger: &Ledger, tile: &Tile, result: Result<TaskOutcome>) -> Result<TaskOutcome> {
    let key = tile.key.clone();
    match result {
        Ok(TaskOutcome::Completed { paths }) => {
            ledger.append(&LedgerRecord::new(key, Status::Complete).with_paths(paths.clone()))?;
            info!("Tile {}: complete, {} paths", tile.key, paths.len());
            Ok(TaskOutcome::Completed { paths })
        }
        Ok(TaskOutcome::Skipped { reason }) => {
            ledger.append(&LedgerRecord::new(key, Status::NoItems).with_comment(reason.clone()))?;
            warn!("Tile {}: {reason}", tile.key);
            Ok(TaskOutcome::Skipped { reason })
        }
        Err(e) => {
            let record = LedgerRecord::new(key, Status::Error).with_comment(e.to_string());
            if let Err(ledger_err) = ledger.append(&record) {
                error!("Tile {}: {e}; the error record could not be appended: {ledger_err}", tile.key);
                return Err(TaskError::from(ledger_err));
            }
            error!("Tile {}: {e}", tile.key);
            Err(e)
        }
    }
}

/// Run one tile end to end and record the outcome.
pub fn run_tile<'a>(
    ledger: &Ledger,
    tile: &'a Tile,
    item_path: &'a ItemPath,
    stages: Stages<'a>,
) -> Result<TaskOutcome> {
    let mut pipeline = TilePipeline::new(tile, item_path, stages);
    let result = pipeline.run();
    record_outcome(ledger, tile, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_path::ItemTime;
    use chrono::Utc;
    use crate::stages::BandStream;
    use wofs_core::{BandSet, Crs, Dataset, GeoBox, Observation, Raster};
    use wofs_grid::TileKey;

    struct Found(usize);
    impl Searcher for Found {
        fn search(&self, _tile: &Tile) -> Result<Vec<Observation>> {
            Ok((0..self.0).map(|i| Observation::new(format!("obs-{i}"), Utc::now())).collect())
        }
    }

    struct Empty;
    impl Searcher for Empty {
        fn search(&self, tile: &Tile) -> Result<Vec<Observation>> {
            Err(TaskError::EmptyCollection(tile.key.to_string()))
        }
    }

    struct Bands;
    impl Loader for Bands {
        fn load<'a>(&'a self, observations: &'a [Observation], geobox: &'a GeoBox) -> BandStream<'a> {
            Box::new(
                observations
                    .iter()
                    .map(|o| Ok(BandSet::new(o.id.clone(), o.datetime, geobox.clone()))),
            )
        }
    }

    struct Count;
    impl Processor for Count {
        fn process(&mut self, bands: BandStream<'_>, tile: &Tile) -> Result<Dataset> {
            let n = bands.collect::<Result<Vec<_>>>()?.len() as i16;
            Ok(Dataset::new(tile.geobox.clone()).with("n", Raster::<i16>::filled(tile.geobox.clone(), n))?)
        }
    }

    struct Broken;
    impl Processor for Broken {
        fn process(&mut self, _bands: BandStream<'_>, _tile: &Tile) -> Result<Dataset> {
            Err(TaskError::Processing("kernel exploded".into()))
        }
    }

    struct Same;
    impl PostProcessor for Same {
        fn post_process(&self, dataset: Dataset, _observations: &[Observation]) -> Result<Dataset> {
            Ok(dataset)
        }
    }

    struct Names;
    impl Writer for Names {
        fn write(&self, dataset: &Dataset, tile: &Tile, item_path: &ItemPath) -> Result<Vec<String>> {
            Ok(dataset.names().map(|n| item_path.path(&tile.key, n, "tif")).collect())
        }
    }

    fn tile() -> Tile {
        let gb = GeoBox::new(2, 2, 0.0, 60.0, 30.0, -30.0, Crs::pdc_mercator());
        Tile::new(TileKey::from_ints(1, 2), gb)
    }

    fn item_path() -> ItemPath {
        ItemPath::new("ls", "wofs", "0.1", ItemTime::Period("2023".into()))
    }

    #[test]
    fn completes_through_every_stage() {
        let (tile, ip) = (tile(), item_path());
        let mut processor = Count;
        let stages = Stages {
            searcher: &Found(3),
            loader: &Bands,
            processor: &mut processor,
            post_processor: &Same,
            writer: &Names,
        };
        let mut pipeline = TilePipeline::new(&tile, &ip, stages);
        let outcome = pipeline.run().unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                paths: vec!["dep_ls_wofs/0-1/001/002/2023/dep_ls_wofs_0-1_001_002_2023_n.tif".into()]
            }
        );
        use PipelineState::*;
        assert_eq!(
            pipeline.history(),
            [Pending, Searching, Loading, Processing, PostProcessing, Writing, Completed]
        );
    }

    #[test]
    fn empty_search_is_skipped() {
        let (tile, ip) = (tile(), item_path());
        for searcher in [&Found(0) as &dyn Searcher, &Empty] {
            let mut processor = Count;
            let stages = Stages {
                searcher,
                loader: &Bands,
                processor: &mut processor,
                post_processor: &Same,
                writer: &Names,
            };
            let mut pipeline = TilePipeline::new(&tile, &ip, stages);
            assert!(matches!(pipeline.run().unwrap(), TaskOutcome::Skipped { .. }));
            assert_eq!(pipeline.state(), PipelineState::Skipped);
        }
    }

    #[test]
    fn failure_is_recorded_before_it_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("log.csv"));
        let (tile, ip) = (tile(), item_path());
        let mut processor = Broken;
        let stages = Stages {
            searcher: &Found(1),
            loader: &Bands,
            processor: &mut processor,
            post_processor: &Same,
            writer: &Names,
        };
        let err = run_tile(&ledger, &tile, &ip, stages).unwrap_err();
        assert!(matches!(err, TaskError::Processing(_)));

        let records = ledger.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Error);
        assert!(records[0].paths.is_empty());
        assert!(records[0].comment.contains("kernel exploded"));
    }
}
