//! wofs: command-line entry points of the WOfS batch engine

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use wofs_algorithms::summary::aggregate::{COUNT_CLEAR, COUNT_NODATA, COUNT_WET};
use wofs_algorithms::wofl::{WoflParams, QA_BAND, REQUIRED_BANDS};
use wofs_cloud::{
    BandSpec, DefaultSource, FsStore, ObjectStore, RasterLoader, StacCatalog, StacClientBlocking,
    StacClientOptions,
};
use wofs_core::Crs;
use wofs_grid::{boundary, Grid, Tile, TileKey};
use wofs_tasks::elevation::DEM_BAND;
use wofs_tasks::{
    parse_datetime, pending_tasks, run_batch, run_multi_item_tile, run_tile, task_list, Config,
    DailyPostProcessor, ElevationCache, FullHistoryProcessor, GeoTiffWriter, ItemPath, ItemTime, Ledger,
    MultiItemTask, PendingTask, Period, ProcessingMode, SearchArea, Stages, StacElevation, StacSearcher,
    StandardPostProcessor, TaskError, TaskOutcome, WofsSummaryProcessor, WoflProcessor,
};

type Source = Arc<DefaultSource>;

// ─── CLI definition ─────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "wofs", author, about = "Water Observations from Space batch engine")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(long, global = true, env = "WOFS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Year, range of years (2020-2023) or one multi-year period (1990/2023)
    #[arg(long)]
    datetime: String,

    /// Dataset version, e.g. 0.7.0
    #[arg(long)]
    version: String,
}

#[derive(Args, Debug)]
struct RetryArgs {
    /// Reprocess tiles whose last record is an error (default)
    #[arg(long, overrides_with = "no_retry_errors")]
    retry_errors: bool,

    /// Leave tiles whose last record is an error alone
    #[arg(long, overrides_with = "retry_errors")]
    no_retry_errors: bool,
}

impl RetryArgs {
    fn enabled(&self) -> bool {
        !self.no_retry_errors
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GridChoice {
    /// Regular (column, row) tiling
    Summary,
    /// Landsat WRS-2 (path, row) footprints
    Scene,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the pending tile tasks as a JSON list
    PrintTasks {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "wofs")]
        dataset_id: String,
        #[arg(long, value_enum, default_value_t = GridChoice::Summary)]
        grid: GridChoice,
        /// Print at most this many tasks
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Daily water observation layers for one Landsat path/row
    Wofl {
        #[arg(long, visible_alias = "region-code")]
        path: i64,
        #[arg(long, visible_alias = "region-index")]
        row: i64,
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "wofl")]
        dataset_id: String,
    },
    /// Annual water summary for one grid cell
    Summary {
        #[arg(long, visible_alias = "region-code", allow_negative_numbers = true)]
        column: i64,
        #[arg(long, visible_alias = "region-index", allow_negative_numbers = true)]
        row: i64,
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "wofs")]
        dataset_id: String,
    },
    /// Combine published annual summaries into an all-time summary
    FullHistory {
        #[arg(long, visible_alias = "region-code", allow_negative_numbers = true)]
        column: i64,
        #[arg(long, visible_alias = "region-index", allow_negative_numbers = true)]
        row: i64,
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "wofs_summary_alltime")]
        dataset_id: String,
    },
    /// Annual summaries for every pending grid cell on this machine
    Batch {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "wofs")]
        dataset_id: String,
        /// Worker threads (default: the configured value, 0 = all cores)
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        retry: RetryArgs,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    // stdout is reserved for print-tasks output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn lookup(grid: &Grid, key: TileKey) -> Result<Tile> {
    match grid.get(&key) {
        Some(tile) => Ok(tile.clone()),
        None => Err(TaskError::UnknownTile(key.to_string()).into()),
    }
}

fn log_outcome(tile: &Tile, period: &Period, outcome: &TaskOutcome, started: Instant) {
    match outcome {
        TaskOutcome::Completed { paths } => info!(
            "Tile {} {period}: wrote {} objects in {:.1?}",
            tile.key,
            paths.len(),
            started.elapsed()
        ),
        TaskOutcome::Skipped { reason } => info!("Tile {} {period}: {reason}", tile.key),
    }
}

/// Run one tile for each period; a failed period does not stop the rest.
fn run_periods(
    tile: &Tile,
    periods: &[Period],
    mut run: impl FnMut(&Period) -> wofs_tasks::Result<TaskOutcome>,
) -> Result<()> {
    let mut failed = 0;
    for period in periods {
        let started = Instant::now();
        match run(period) {
            Ok(outcome) => log_outcome(tile, period, &outcome, started),
            Err(e) => {
                error!("Tile {} {period}: {e}", tile.key);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} periods failed for tile {}", periods.len(), tile.key);
    }
    Ok(())
}

/// One grid cell and period of a batch run
struct CellTask<'a> {
    tile: &'a Tile,
    task: PendingTask<'a>,
}

impl fmt::Display for CellTask<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.task, f)
    }
}

/// Everything a command builds from the configuration
struct Session {
    config: Config,
    store: Arc<FsStore>,
}

impl Session {
    fn new(config: Config) -> Self {
        let store = Arc::new(FsStore::new(config.output_root.clone()));
        Self { config, store }
    }

    fn client(&self, catalog: &str) -> Result<Arc<StacClientBlocking>> {
        let options = StacClientOptions {
            request_timeout: self.config.request_timeout(),
            ..Default::default()
        };
        let client = StacClientBlocking::new(StacCatalog::from_str_or_url(catalog), options)
            .with_context(|| format!("Failed to create STAC client for {catalog}"))?;
        Ok(Arc::new(client))
    }

    fn source(&self) -> Result<Source> {
        let source = DefaultSource::new(self.config.request_timeout())
            .context("Failed to create asset source")?;
        Ok(Arc::new(source))
    }

    fn item_path(&self, dataset_id: &str, version: &str, time: impl Into<String>) -> ItemPath {
        ItemPath::new(&self.config.sensor, dataset_id, version, ItemTime::Period(time.into()))
    }

    fn ledger(&self, item_path: &ItemPath) -> Ledger {
        Ledger::new(self.store.path_for(&item_path.log_path()))
    }

    /// One ledger per period
    fn period_ledgers(&self, dataset_id: &str, version: &str, periods: &[Period]) -> Vec<(Period, Ledger)> {
        periods
            .iter()
            .map(|p| (*p, self.ledger(&self.item_path(dataset_id, version, p.to_string()))))
            .collect()
    }

    fn writer(&self, dataset_id: &str) -> GeoTiffWriter {
        let store: Arc<dyn ObjectStore> = self.store.clone();
        GeoTiffWriter::new(store).collection(format!("dep_{}_{dataset_id}", self.config.sensor))
    }

    fn summary_grid(&self) -> Result<Grid> {
        let pb = spinner("Building summary grid...");
        let land = boundary::load_boundary(&self.config.land_boundary)
            .context("Failed to load land boundary")?;
        let grid = self.config.summary_grid.build(&land, &Crs::wgs84())?;
        pb.finish_and_clear();
        info!("Summary grid: {} tiles", grid.len());
        Ok(grid)
    }

    fn scene_grid(&self) -> Result<Grid> {
        let pb = spinner("Building scene grid...");
        let footprints = boundary::load_features(&self.config.scene_footprints)
            .context("Failed to load scene footprints")?;
        let land = boundary::load_boundary(&self.config.land_boundary)
            .context("Failed to load land boundary")?;
        let grid = self
            .config
            .scene_grid
            .build(&footprints, Some((&land, &Crs::wgs84())))?;
        pb.finish_and_clear();
        info!("Scene grid: {} tiles", grid.len());
        Ok(grid)
    }

    /// Surface reflectance plus `qa_pixel`, zero and fill as no-data
    fn landsat_loader(&self, source: &Source) -> RasterLoader<Source> {
        let mut bands: Vec<BandSpec> = REQUIRED_BANDS
            .iter()
            .map(|name| BandSpec::new(*name, Some(0.0)))
            .collect();
        bands.push(BandSpec::new(QA_BAND, Some(1.0)));
        RasterLoader::new(Arc::clone(source), bands)
    }

    fn landsat_searcher(
        &self,
        client: &Arc<StacClientBlocking>,
        period: &Period,
        area: SearchArea,
    ) -> StacSearcher {
        let searcher = StacSearcher::new(Arc::clone(client), &[self.config.landsat_collection.as_str()])
            .datetime(period.search_range())
            .area(area)
            .exclude_platforms(self.config.exclude_platforms.as_slice());
        match &self.config.landsat_alternate {
            Some(alternate) => searcher.alternate(alternate.clone()),
            None => searcher,
        }
    }

    /// DEM client, when terrain masking is on
    fn elevation_client(&self) -> Result<Option<Arc<StacClientBlocking>>> {
        if !self.config.terrain_mask {
            return Ok(None);
        }
        self.client(&self.config.elevation_catalog).map(Some)
    }

    fn elevation_cache(&self, client: &Arc<StacClientBlocking>, source: &Source) -> ElevationCache {
        let loader = RasterLoader::new(Arc::clone(source), vec![BandSpec::new(DEM_BAND, None)]);
        let dem = StacElevation::new(Arc::clone(client), &self.config.elevation_collection, loader);
        ElevationCache::new(Box::new(dem))
    }

    fn summary_processor(
        &self,
        dem_client: Option<&Arc<StacClientBlocking>>,
        source: &Source,
    ) -> WofsSummaryProcessor {
        let processor = WofsSummaryProcessor::new(WoflParams::default());
        match dem_client {
            Some(client) => processor.with_elevation(self.elevation_cache(client, source)),
            None => processor,
        }
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn print_tasks(
    session: &Session,
    run: RunArgs,
    dataset_id: String,
    grid: GridChoice,
    limit: Option<usize>,
    retry: RetryArgs,
) -> Result<()> {
    let periods = parse_datetime(&run.datetime)?;
    let grid = match grid {
        GridChoice::Summary => session.summary_grid()?,
        GridChoice::Scene => session.scene_grid()?,
    };
    let ledgers = session.period_ledgers(&dataset_id, &run.version, &periods);
    let keys: Vec<TileKey> = grid.keys().cloned().collect();
    let pending = pending_tasks(&keys, &ledgers, retry.enabled()).context("Failed to read ledgers")?;
    info!(
        "{} of {} tile tasks pending",
        pending.len(),
        keys.len() * periods.len()
    );

    let tasks = task_list(grid.kind(), &pending, limit);
    println!("{}", serde_json::to_string(&tasks)?);
    Ok(())
}

fn wofl(session: &Session, path: i64, row: i64, run: RunArgs, dataset_id: String) -> Result<()> {
    let periods = parse_datetime(&run.datetime)?;
    let grid = session.scene_grid()?;
    let tile = lookup(&grid, TileKey::from_ints(path, row))?;

    let source = session.source()?;
    let landsat = session.client(&session.config.landsat_catalog)?;
    let loader = session.landsat_loader(&source);
    let mut processor = WoflProcessor::new(WoflParams::default());
    if let Some(client) = session.elevation_client()? {
        processor = processor.with_elevation(session.elevation_cache(&client, &source));
    }
    let post_processor = DailyPostProcessor::new(
        StandardPostProcessor::new(false).with_attr("dep_version", run.version.clone()),
    );
    let writer = session.writer(&dataset_id);
    let store: &dyn ObjectStore = session.store.as_ref();

    run_periods(&tile, &periods, |period| {
        let item_path = session.item_path(&dataset_id, &run.version, period.to_string());
        let ledger = session.ledger(&item_path);
        let searcher = session.landsat_searcher(&landsat, period, SearchArea::LandsatPathRow);
        let mut task = MultiItemTask {
            tile: &tile,
            item_path: &item_path,
            loader: &loader,
            processor: &mut processor,
            post_processor: &post_processor,
            writer: &writer,
            store,
        };
        run_multi_item_tile(&ledger, &searcher, &mut task)
    })
}

fn summary(session: &Session, column: i64, row: i64, run: RunArgs, dataset_id: String) -> Result<()> {
    let periods = parse_datetime(&run.datetime)?;
    let grid = session.summary_grid()?;
    let tile = lookup(&grid, TileKey::from_ints(column, row))?;

    let source = session.source()?;
    let landsat = session.client(&session.config.landsat_catalog)?;
    let dem_client = session.elevation_client()?;
    let loader = session.landsat_loader(&source);
    let mut processor = session.summary_processor(dem_client.as_ref(), &source);
    let post_processor = StandardPostProcessor::default().with_attr("dep_version", run.version.clone());
    let writer = session.writer(&dataset_id);

    run_periods(&tile, &periods, |period| {
        let item_path = session.item_path(&dataset_id, &run.version, period.to_string());
        let ledger = session.ledger(&item_path);
        let searcher = session.landsat_searcher(&landsat, period, SearchArea::Bounds);
        let stages = Stages {
            searcher: &searcher,
            loader: &loader,
            processor: &mut processor,
            post_processor: &post_processor,
            writer: &writer,
        };
        run_tile(&ledger, &tile, &item_path, stages)
    })
}

fn full_history(session: &Session, column: i64, row: i64, run: RunArgs, dataset_id: String) -> Result<()> {
    let periods = parse_datetime(&run.datetime)?;
    let grid = session.summary_grid()?;
    let tile = lookup(&grid, TileKey::from_ints(column, row))?;

    let client = session.client(&session.config.summaries_catalog)?;
    let nodata = Some(COUNT_NODATA as f32);
    let loader = RasterLoader::new(
        session.source()?,
        vec![BandSpec::new(COUNT_CLEAR, nodata), BandSpec::new(COUNT_WET, nodata)],
    );
    let mut processor = FullHistoryProcessor;
    let post_processor = StandardPostProcessor::new(false).with_attr("dep_version", run.version.clone());
    let writer = session.writer(&dataset_id);

    run_periods(&tile, &periods, |period| {
        let item_path = session.item_path(&dataset_id, &run.version, period.to_string());
        let ledger = session.ledger(&item_path);
        let searcher = StacSearcher::new(
            Arc::clone(&client),
            &[session.config.annual_summary_collection.as_str()],
        )
        .datetime(period.search_range())
        .area(SearchArea::Bounds);
        let stages = Stages {
            searcher: &searcher,
            loader: &loader,
            processor: &mut processor,
            post_processor: &post_processor,
            writer: &writer,
        };
        run_tile(&ledger, &tile, &item_path, stages)
    })
}

fn batch(
    session: &Session,
    run: RunArgs,
    dataset_id: String,
    threads: Option<usize>,
    limit: Option<usize>,
    retry: RetryArgs,
) -> Result<()> {
    let periods = parse_datetime(&run.datetime)?;
    let grid = session.summary_grid()?;
    let ledgers = session.period_ledgers(&dataset_id, &run.version, &periods);
    let keys: Vec<TileKey> = grid.keys().cloned().collect();
    let pending = pending_tasks(&keys, &ledgers, retry.enabled()).context("Failed to read ledgers")?;

    let mut cells: Vec<CellTask> = pending
        .into_iter()
        .filter_map(|task| grid.get(task.key).map(|tile| CellTask { tile, task }))
        .collect();
    if let Some(limit) = limit {
        cells.truncate(limit);
    }
    if cells.is_empty() {
        info!("Nothing to do: all {} tile tasks are finished", keys.len() * periods.len());
        return Ok(());
    }

    let source = session.source()?;
    let landsat = session.client(&session.config.landsat_catalog)?;
    let dem_client = session.elevation_client()?;
    let loader = session.landsat_loader(&source);
    let post_processor = StandardPostProcessor::default().with_attr("dep_version", run.version.clone());
    let writer = session.writer(&dataset_id);
    let mode = ProcessingMode::from_threads(threads.unwrap_or(session.config.threads));

    let start = Instant::now();
    let pb = spinner(&format!("Processing {} tile tasks...", cells.len()));
    let report = run_batch(
        mode,
        &cells,
        || session.summary_processor(dem_client.as_ref(), &source),
        |processor, cell| {
            let period = cell.task.period;
            let item_path = session.item_path(&dataset_id, &run.version, period.to_string());
            let searcher = session.landsat_searcher(&landsat, period, SearchArea::Bounds);
            let stages = Stages {
                searcher: &searcher,
                loader: &loader,
                processor,
                post_processor: &post_processor,
                writer: &writer,
            };
            run_tile(cell.task.ledger, cell.tile, &item_path, stages)
        },
    )?;
    pb.finish_and_clear();
    info!(
        "{} tasks in {:.1?}: {} complete, {} skipped",
        report.len(),
        start.elapsed(),
        report.completed.len(),
        report.skipped.len()
    );

    for (label, reason) in &report.failed {
        error!("{label}: {reason}");
    }
    if !report.is_success() {
        bail!("{} of {} tile tasks failed", report.failed.len(), report.len());
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let session = Session::new(config);

    match cli.command {
        Commands::PrintTasks {
            run,
            dataset_id,
            grid,
            limit,
            retry,
        } => print_tasks(&session, run, dataset_id, grid, limit, retry),
        Commands::Wofl {
            path,
            row,
            run,
            dataset_id,
        } => wofl(&session, path, row, run, dataset_id),
        Commands::Summary {
            column,
            row,
            run,
            dataset_id,
        } => summary(&session, column, row, run, dataset_id),
        Commands::FullHistory {
            column,
            row,
            run,
            dataset_id,
        } => full_history(&session, column, row, run, dataset_id),
        Commands::Batch {
            run,
            dataset_id,
            threads,
            limit,
            retry,
        } => batch(&session, run, dataset_id, threads, limit, retry),
    }
}
