//! Local batch runner
//!
//! Runs many tile tasks on a rayon pool. Each worker builds its own
//! processor (and therefore its own elevation cache) through `init`, and a
//! failing tile never stops its siblings.

use std::collections::HashSet;
use std::fmt::{self, Display};

use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info};
use wofs_grid::{GridKind, TileKey};

use crate::error::{Result, TaskError};
use crate::ledger::Ledger;
use crate::period::Period;
use crate::pipeline::TaskOutcome;

/// Processing mode for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One tile at a time on the calling thread
    Sequential,
    /// All available cores
    #[default]
    Parallel,
    /// A dedicated pool with this many threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// `0` means all cores, `1` sequential
    pub fn from_threads(threads: usize) -> Self {
        match threads {
            0 => Self::Parallel,
            1 => Self::Sequential,
            n => Self::ParallelWith(n),
        }
    }
}

/// One (tile, period) unit of work and the ledger its outcome goes to
#[derive(Debug, Clone, Copy)]
pub struct PendingTask<'a> {
    pub key: &'a TileKey,
    pub period: &'a Period,
    pub ledger: &'a Ledger,
}

impl fmt::Display for PendingTask<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {} {}", self.key, self.period)
    }
}

/// Every (tile, period) pair that still needs running, tiles outermost.
///
/// `ledgers` pairs each period with its own ledger; a tile is filtered
/// against each period's ledger separately, so a finished period never
/// hides an unfinished one.
pub fn pending_tasks<'a>(
    keys: &'a [TileKey],
    ledgers: &'a [(Period, Ledger)],
    retry_errors: bool,
) -> Result<Vec<PendingTask<'a>>> {
    let mut pending: Vec<HashSet<TileKey>> = Vec::with_capacity(ledgers.len());
    for (period, ledger) in ledgers {
        let keep: HashSet<TileKey> = ledger.pending(keys, retry_errors)?.into_iter().collect();
        debug!("{period}: {} of {} tiles pending", keep.len(), keys.len());
        pending.push(keep);
    }
    Ok(keys
        .iter()
        .flat_map(|key| {
            ledgers
                .iter()
                .zip(&pending)
                .filter(move |(_, keep)| keep.contains(key))
                .map(move |((period, ledger), _)| PendingTask { key, period, ledger })
        })
        .collect())
}

/// Parameters of each task, optionally truncated to the first `limit`.
///
/// Each entry names the key parts after the grid kind, e.g.
/// `{"column": "63", "row": "20", "datetime": "2023"}`.
pub fn task_list(kind: GridKind, tasks: &[PendingTask<'_>], limit: Option<usize>) -> Vec<Value> {
    let (first, second) = kind.key_names();
    tasks
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|task| {
            let mut entry = Map::new();
            entry.insert(first.into(), Value::from(task.key.first()));
            entry.insert(second.into(), Value::from(task.key.second()));
            entry.insert("datetime".into(), Value::from(task.period.to_string()));
            Value::Object(entry)
        })
        .collect()
}

/// Tally of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    /// Task label and error text
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    fn record(&mut self, label: String, result: Result<TaskOutcome>) {
        match result {
            Ok(TaskOutcome::Completed { .. }) => self.completed.push(label),
            Ok(TaskOutcome::Skipped { .. }) => self.skipped.push(label),
            Err(e) => self.failed.push((label, e.to_string())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `task` over `items`.
///
/// `init` is called once per worker (once in total for
/// [`ProcessingMode::Sequential`]); the state it returns is reused for
/// every item that worker handles.
pub fn run_batch<T, P, I, F>(mode: ProcessingMode, items: &[T], init: I, task: F) -> Result<BatchReport>
where
    T: Display + Sync,
    I: Fn() -> P + Sync + Send,
    F: Fn(&mut P, &T) -> Result<TaskOutcome> + Sync + Send,
{
    let run_one = |state: &mut P, item: &T| (item.to_string(), task(state, item));
    let results: Vec<(String, Result<TaskOutcome>)> = match mode {
        ProcessingMode::Sequential => {
            let mut state = init();
            items.iter().map(|item| run_one(&mut state, item)).collect()
        }
        ProcessingMode::Parallel => items.par_iter().map_init(&init, run_one).collect(),
        ProcessingMode::ParallelWith(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| TaskError::Config(format!("thread pool of {threads}: {e}")))?;
            pool.install(|| items.par_iter().map_init(&init, run_one).collect())
        }
    };

    let mut report = BatchReport::default();
    for (label, result) in results {
        report.record(label, result);
    }
    info!(
        "Batch finished: {} complete, {} skipped, {} failed",
        report.completed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerRecord, Status};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(seen: &mut Vec<u32>, n: &u32) -> Result<TaskOutcome> {
        seen.push(*n);
        match n % 3 {
            0 => Err(TaskError::Processing(format!("tile {n} failed"))),
            1 => Ok(TaskOutcome::Completed { paths: vec![n.to_string()] }),
            _ => Ok(TaskOutcome::Skipped { reason: "empty".into() }),
        }
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let items: Vec<u32> = (1..=9).collect();
        for mode in [ProcessingMode::Sequential, ProcessingMode::Parallel, ProcessingMode::ParallelWith(2)] {
            let report = run_batch(mode, &items, Vec::new, task).unwrap();
            assert_eq!(report.len(), 9);
            assert_eq!(report.completed, ["1", "4", "7"]);
            assert_eq!(report.skipped, ["2", "5", "8"]);
            assert_eq!(report.failed.len(), 3);
            assert!(!report.is_success());
        }
    }

    #[test]
    fn sequential_initializes_once() {
        let inits = AtomicUsize::new(0);
        let init = || {
            inits.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        };
        let items: Vec<u32> = (1..=5).collect();
        run_batch(ProcessingMode::Sequential, &items, init, task).unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_batch() {
        let report = run_batch(ProcessingMode::Parallel, &[] as &[u32], Vec::new, task).unwrap();
        assert!(report.is_empty() && report.is_success());
    }

    fn ledgers(dir: &std::path::Path, years: &[i32]) -> Vec<(Period, Ledger)> {
        years
            .iter()
            .map(|y| (Period::year(*y), Ledger::new(dir.join(format!("{y}_log.csv")))))
            .collect()
    }

    #[test]
    fn task_list_is_tiles_times_periods() {
        let dir = tempfile::tempdir().unwrap();
        let keys = [TileKey::from_ints(63, 20), TileKey::from_ints(64, 20)];
        let ledgers = ledgers(dir.path(), &[2022, 2023]);
        let tasks = pending_tasks(&keys, &ledgers, true).unwrap();
        let list = task_list(GridKind::Summary, &tasks, None);
        assert_eq!(list.len(), 4);
        assert_eq!(list[0], serde_json::json!({"column": "63", "row": "20", "datetime": "2022"}));
        assert_eq!(list[3]["column"], "64");
        assert_eq!(list[3]["datetime"], "2023");

        let limited = task_list(GridKind::Scene, &tasks, Some(3));
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[0]["path"], "63");
    }

    #[test]
    fn periods_are_filtered_independently() {
        let dir = tempfile::tempdir().unwrap();
        let tile = TileKey::from_ints(1, 2);
        let other = TileKey::from_ints(3, 4);
        let ledgers = ledgers(dir.path(), &[2021, 2022]);
        ledgers[0].1.append(&LedgerRecord::new(tile.clone(), Status::Error)).unwrap();
        ledgers[1].1.append(&LedgerRecord::new(tile.clone(), Status::Complete)).unwrap();
        ledgers[1].1.append(&LedgerRecord::new(other.clone(), Status::NoItems)).unwrap();

        let keys = [tile.clone(), other.clone()];
        let labels = |retry| -> Vec<String> {
            pending_tasks(&keys, &ledgers, retry)
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect()
        };
        // The failed 2021 run stays pending even though 2022 completed.
        assert_eq!(labels(true), ["tile (1, 2) 2021", "tile (3, 4) 2021"]);
        assert_eq!(labels(false), ["tile (3, 4) 2021"]);
    }

    #[test]
    fn mode_from_threads() {
        assert_eq!(ProcessingMode::from_threads(0), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_threads(1), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_threads(4), ProcessingMode::ParallelWith(4));
    }
}
