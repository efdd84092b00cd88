//! # wofs-tasks
//!
//! Tile task orchestration for the WOfS batch engine.
//!
//! A tile task searches a catalog, loads bands onto the tile geobox, runs a
//! processor, post-processes and writes the result. Every outcome is
//! appended to a durable [`Ledger`] kept per dataset version and period, and
//! the next run uses [`batch::pending_tasks`] to pick up only unfinished
//! (tile, period) pairs.
//!
//! - [`pipeline`]: the single-tile state machine and its ledger wrapper
//! - [`fanout`]: per-observation pipelines for daily products
//! - [`batch`]: rayon-backed runner over many tiles
//! - [`stages`]: the capability traits pipelines are assembled from

pub mod batch;
pub mod config;
pub mod elevation;
pub mod error;
pub mod fanout;
pub mod item_path;
pub mod ledger;
pub mod period;
pub mod pipeline;
pub mod post_process;
pub mod processors;
pub mod searchers;
pub mod stages;
pub mod writer;

pub use batch::{pending_tasks, run_batch, task_list, BatchReport, PendingTask, ProcessingMode};
pub use config::Config;
pub use elevation::{ElevationCache, ElevationSource, StacElevation};
pub use error::{LedgerError, Result, TaskError};
pub use fanout::{run_multi_item_tile, FanOutReport, MultiItemTask};
pub use item_path::{ItemPath, ItemTime};
pub use ledger::{filter_pending, Ledger, LedgerRecord, Status};
pub use period::{parse_datetime, Period};
pub use pipeline::{run_tile, PipelineState, Stages, TaskOutcome, TilePipeline};
pub use post_process::{DailyPostProcessor, StandardPostProcessor};
pub use processors::{FullHistoryProcessor, WofsSummaryProcessor, WoflProcessor};
pub use searchers::{ItemSearcher, SearchArea, StacSearcher};
pub use stages::{BandStream, Loader, PostProcessor, Processor, Searcher, Writer};
pub use writer::GeoTiffWriter;
