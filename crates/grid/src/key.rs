//! Two-part tile keys
//!
//! Every grid addresses its tiles with a pair: `(column, row)` for the
//! summary grid, `(path, row)` for Landsat scenes. Keys are written to the
//! task ledger in tuple form, `(a, b)`, and read back from it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

/// Composite key of a tile.
///
/// Keys order numerically part by part where the parts are integers, so
/// `(9, 1)` sorts before `(10, 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    first: String,
    second: String,
}

impl TileKey {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn from_ints(first: i64, second: i64) -> Self {
        Self::new(first.to_string(), second.to_string())
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    /// Parts with numeric values zero-padded to `width` digits.
    ///
    /// Non-numeric parts are returned unchanged.
    pub fn padded(&self, width: usize) -> (String, String) {
        (pad(&self.first, width), pad(&self.second, width))
    }

    /// `a/b` with three-digit padding, the folder form used in output paths
    pub fn path_segment(&self) -> String {
        let (a, b) = self.padded(3);
        format!("{a}/{b}")
    }
}

fn sort_key(part: &str) -> (Option<i64>, &str) {
    (part.parse().ok(), part)
}

impl Ord for TileKey {
    fn cmp(&self, other: &Self) -> Ordering {
        sort_key(&self.first)
            .cmp(&sort_key(&other.first))
            .then_with(|| sort_key(&self.second).cmp(&sort_key(&other.second)))
    }
}

impl PartialOrd for TileKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn pad(part: &str, width: usize) -> String {
    match part.parse::<i64>() {
        Ok(n) if n < 0 => format!("-{:0width$}", n.unsigned_abs(), width = width.saturating_sub(1)),
        Ok(n) => format!("{n:0width$}"),
        Err(_) => part.to_string(),
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

impl FromStr for TileKey {
    type Err = GridError;

    /// Accepts `(a, b)`, `a,b` and quoted tuple parts such as `('73', '72')`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim();
        let inner = inner
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(inner);
        let mut parts = inner.split(',').map(|p| p.trim().trim_matches(|c| c == '\'' || c == '"'));
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => Ok(Self::new(a, b)),
            _ => Err(GridError::InvalidKey(s.to_string())),
        }
    }
}

impl From<(i64, i64)> for TileKey {
    fn from((a, b): (i64, i64)) -> Self {
        Self::from_ints(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let key = TileKey::from_ints(65, 7);
        assert_eq!(key.to_string(), "(65, 7)");
        assert_eq!("(65, 7)".parse::<TileKey>().unwrap(), key);
    }

    #[test]
    fn test_parse_variants() {
        let key = TileKey::new("073", "072");
        assert_eq!("('073', '072')".parse::<TileKey>().unwrap(), key);
        assert_eq!("073,072".parse::<TileKey>().unwrap(), key);
        assert!("(1, 2, 3)".parse::<TileKey>().is_err());
        assert!("()".parse::<TileKey>().is_err());
        assert!("12".parse::<TileKey>().is_err());
    }

    #[test]
    fn test_padding() {
        assert_eq!(TileKey::from_ints(73, 7).path_segment(), "073/007");
        assert_eq!(TileKey::new("FJ", "12").padded(3), ("FJ".to_string(), "012".to_string()));
        assert_eq!(TileKey::from_ints(-4, 1234).padded(3), ("-04".to_string(), "1234".to_string()));
    }

    #[test]
    fn test_ordering_is_stable() {
        let mut keys = vec![TileKey::from_ints(2, 1), TileKey::from_ints(1, 9)];
        keys.sort();
        assert_eq!(keys[0], TileKey::from_ints(1, 9));
    }

    #[test]
    fn test_numeric_parts_sort_as_numbers() {
        let mut keys = vec![
            TileKey::from_ints(10, 1),
            TileKey::from_ints(9, 10),
            TileKey::from_ints(9, 2),
            TileKey::from_ints(-1, 0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            [
                TileKey::from_ints(-1, 0),
                TileKey::from_ints(9, 2),
                TileKey::from_ints(9, 10),
                TileKey::from_ints(10, 1),
            ]
        );
        // Zero-padded and plain spellings stay distinct but adjacent.
        assert!(TileKey::new("09", "1") < TileKey::new("9", "1"));
        assert!(TileKey::new("9", "1") < TileKey::from_ints(10, 1));
    }
}
