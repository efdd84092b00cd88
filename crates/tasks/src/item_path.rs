//! Output locations for one dataset version
//!
//! ```text
//! dep_ls_wofs/0-7/063/020/2023/dep_ls_wofs_0-7_063_020_2023_frequency.tif
//! dep_ls_wofl/1-0-0/073/072/2023/05/01/dep_ls_wofl_1-0-0_073_072_2023-05-01_water.tif
//! dep_ls_wofs/0-7/logs/dep_ls_wofs_0-7_2023_log.csv
//! ```

use chrono::{Datelike, NaiveDate};
use wofs_grid::TileKey;

/// Time component of an item path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemTime {
    /// A period label such as `2023` or `1990/2023`
    Period(String),
    /// One acquisition day
    Daily(NaiveDate),
}

impl ItemTime {
    fn folder(&self) -> String {
        match self {
            Self::Period(p) => p.replace('/', "_"),
            Self::Daily(d) => format!("{:04}/{:02}/{:02}", d.year(), d.month(), d.day()),
        }
    }

    fn stem(&self) -> String {
        match self {
            Self::Period(p) => p.replace('/', "_"),
            Self::Daily(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Naming scheme for the artifacts of one dataset version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPath {
    pub sensor: String,
    pub dataset_id: String,
    pub version: String,
    pub time: ItemTime,
}

impl ItemPath {
    pub fn new(
        sensor: impl Into<String>,
        dataset_id: impl Into<String>,
        version: impl Into<String>,
        time: ItemTime,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            dataset_id: dataset_id.into(),
            version: version.into(),
            time,
        }
    }

    /// Same dataset, one acquisition day
    pub fn with_date(&self, date: NaiveDate) -> Self {
        Self {
            time: ItemTime::Daily(date),
            ..self.clone()
        }
    }

    fn prefix(&self) -> String {
        format!("dep_{}_{}", self.sensor, self.dataset_id)
    }

    fn version_label(&self) -> String {
        self.version.replace('.', "-")
    }

    /// Directory holding every artifact of `key`
    pub fn folder(&self, key: &TileKey) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix(),
            self.version_label(),
            key.path_segment(),
            self.time.folder()
        )
    }

    pub fn basename(&self, key: &TileKey) -> String {
        let (a, b) = key.padded(3);
        format!(
            "{}_{}_{a}_{b}_{}",
            self.prefix(),
            self.version_label(),
            self.time.stem()
        )
    }

    /// Path of one variable, e.g. `path(key, "frequency", "tif")`
    pub fn path(&self, key: &TileKey, variable: &str, ext: &str) -> String {
        format!("{}/{}_{variable}.{ext}", self.folder(key), self.basename(key))
    }

    /// Path of the JSON item sidecar
    pub fn stac_path(&self, key: &TileKey) -> String {
        format!("{}/{}.stac-item.json", self.folder(key), self.basename(key))
    }

    /// Ledger location; one ledger per dataset version and period, so an
    /// outcome for one period never masks another.
    pub fn log_path(&self) -> String {
        format!(
            "{p}/{v}/logs/{p}_{v}_{t}_log.csv",
            p = self.prefix(),
            v = self.version_label(),
            t = self.time.stem()
        )
    }

    /// Dead-letter object for an observation that failed inside a fan-out
    pub fn dead_letter_path(&self, key: &TileKey, observation_id: &str) -> String {
        format!(
            "{}/{}/logs/errors/{}/{observation_id}.error.txt",
            self.prefix(),
            self.version_label(),
            key.path_segment()
        )
    }
}
