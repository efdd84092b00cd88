//! Append-only task ledger
//!
//! One pipe-delimited line per tile attempt or outcome:
//!
//! ```text
//! time|index|status|paths|comment
//! 2024-03-01T02:11:09Z|(63, 20)|complete|["dep_ls_wofs/0-7/063/020/2023/..._frequency.tif"]|
//! ```
//!
//! The ledger is only ever appended to. Each file covers one dataset version
//! and one period, so the current state of a (tile, period) pair is the
//! status of the tile's last line in that period's file, and
//! [`filter_pending`] derives the work list for the next run from that.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use wofs_grid::TileKey;

use crate::error::LedgerError;

pub const HEADER: [&str; 5] = ["time", "index", "status", "paths", "comment"];
const DELIMITER: u8 = b'|';

/// Outcome recorded for a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Start,
    Complete,
    Error,
    /// The search found nothing; terminal, never retried
    NoItems,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::NoItems => "no items found",
        }
    }

    /// Whether this status means the tile needs no more work
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::NoItems)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Self::Start),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "no items found" => Ok(Self::NoItems),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

/// One ledger line
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub time: DateTime<Utc>,
    pub key: TileKey,
    pub status: Status,
    pub paths: Vec<String>,
    pub comment: String,
}

impl LedgerRecord {
    pub fn new(key: TileKey, status: Status) -> Self {
        Self {
            time: Utc::now(),
            key,
            status,
            paths: Vec::new(),
            comment: String::new(),
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    fn to_row(&self) -> Result<[String; 5], serde_json::Error> {
        Ok([
            self.time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.key.to_string(),
            self.status.to_string(),
            serde_json::to_string(&self.paths)?,
            self.comment.clone(),
        ])
    }

    fn from_row(row: &csv::StringRecord) -> Result<Self, String> {
        if row.len() != HEADER.len() {
            return Err(format!("expected {} fields, found {}", HEADER.len(), row.len()));
        }
        let time = DateTime::parse_from_rfc3339(&row[0])
            .map_err(|e| format!("time {:?}: {e}", &row[0]))?
            .with_timezone(&Utc);
        let key = row[1].parse::<TileKey>().map_err(|e| e.to_string())?;
        let status = row[2].parse::<Status>()?;
        let paths = if row[3].trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row[3]).map_err(|e| format!("paths {:?}: {e}", &row[3]))?
        };
        Ok(Self {
            time,
            key,
            status,
            paths,
            comment: row[4].to_string(),
        })
    }
}

/// Last record per key, in key order
pub fn latest(records: &[LedgerRecord]) -> BTreeMap<TileKey, &LedgerRecord> {
    let mut out = BTreeMap::new();
    for r in records {
        out.insert(r.key.clone(), r);
    }
    out
}

/// Keys from `candidates` that still need running.
///
/// A key is dropped when its last record is terminal (`complete` or
/// `no items found`), or is `error` and `retry_errors` is false. Keys with
/// no record, or whose last record is `start`, stay pending. Candidate
/// order is preserved.
pub fn filter_pending(candidates: &[TileKey], records: &[LedgerRecord], retry_errors: bool) -> Vec<TileKey> {
    let last = latest(records);
    candidates
        .iter()
        .filter(|key| match last.get(*key).map(|r| r.status) {
            Some(s) if s.is_terminal() => false,
            Some(Status::Error) => retry_errors,
            _ => true,
        })
        .cloned()
        .collect()
}

/// A ledger file on local storage
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
        move |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self) -> impl FnOnce(csv::Error) -> LedgerError + '_ {
        move |source| LedgerError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Full history in file order. A missing file is an empty history; any
    /// unreadable or malformed line fails the whole load.
    pub fn load(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err()(e)),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers().map_err(self.csv_err())?.clone();
        if !headers.is_empty() && headers.iter().map(str::trim).ne(HEADER) {
            return Err(LedgerError::Malformed {
                path: self.path.clone(),
                line: 1,
                reason: format!("unexpected header {:?}", headers.iter().collect::<Vec<_>>()),
            });
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(self.csv_err())?;
            let line = row.position().map_or(0, |p| p.line());
            let record = LedgerRecord::from_row(&row).map_err(|reason| LedgerError::Malformed {
                path: self.path.clone(),
                line,
                reason,
            })?;
            records.push(record);
        }
        debug!("Loaded {} ledger records from {}", records.len(), self.path.display());
        Ok(records)
    }

    /// Append one record. The line is flushed and synced to disk before
    /// this returns. Appends from threads sharing this ledger never
    /// interleave.
    pub fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let _guard = self.append_lock.lock().map_err(|_| LedgerError::Poisoned)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(self.io_err())?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(self.io_err())?;
        let is_new = file.metadata().map_err(self.io_err())?.len() == 0;

        let row = record.to_row().map_err(|e| LedgerError::Malformed {
            path: self.path.clone(),
            line: 0,
            reason: e.to_string(),
        })?;
        let mut buf = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(DELIMITER)
                .has_headers(false)
                .from_writer(&mut buf);
            if is_new {
                writer.write_record(HEADER).map_err(self.csv_err())?;
            }
            writer.write_record(&row).map_err(self.csv_err())?;
            writer.flush().map_err(self.io_err())?;
        }
        file.write_all(&buf).map_err(self.io_err())?;
        file.flush().map_err(self.io_err())?;
        file.sync_all().map_err(self.io_err())?;
        Ok(())
    }

    /// Convenience: load, then [`filter_pending`].
    pub fn pending(&self, candidates: &[TileKey], retry_errors: bool) -> Result<Vec<TileKey>, LedgerError> {
        Ok(filter_pending(candidates, &self.load()?, retry_errors))
    }
}
