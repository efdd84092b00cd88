//! Year periods accepted on the command line
//!
//! `2023` is one period, `2020-2023` expands to one period per year and
//! `2020/2023` is a single multi-year period.

use std::fmt;

use crate::error::{Result, TaskError};

/// An inclusive range of whole years
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period {
    pub start: i32,
    pub end: i32,
}

impl Period {
    pub fn year(year: i32) -> Self {
        Self { start: year, end: year }
    }

    /// RFC 3339 interval for a STAC `datetime` query
    pub fn search_range(&self) -> String {
        format!("{}-01-01T00:00:00Z/{}-12-31T23:59:59Z", self.start, self.end)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}/{}", self.start, self.end)
        }
    }
}

fn parse_year(value: &str, part: &str) -> Result<i32> {
    let part = part.trim();
    if part.len() != 4 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TaskError::Period {
            value: value.to_string(),
            reason: format!("{part:?} is not a four-digit year"),
        });
    }
    part.parse().map_err(|_| TaskError::Period {
        value: value.to_string(),
        reason: format!("{part:?} is not a year"),
    })
}

fn ordered(value: &str, start: i32, end: i32) -> Result<(i32, i32)> {
    if start > end {
        return Err(TaskError::Period {
            value: value.to_string(),
            reason: format!("{start} is after {end}"),
        });
    }
    Ok((start, end))
}

/// Parse a `--datetime` value into the periods to process.
pub fn parse_datetime(value: &str) -> Result<Vec<Period>> {
    let reject = |reason: &str| TaskError::Period {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = value.trim();
    if trimmed.contains(',') {
        return Err(reject("lists of periods are not supported"));
    }

    if let Some((a, b)) = trimmed.split_once('/') {
        if b.contains('/') || trimmed.contains('-') {
            return Err(reject("expected YYYY/YYYY"));
        }
        let (start, end) = ordered(value, parse_year(value, a)?, parse_year(value, b)?)?;
        return Ok(vec![Period { start, end }]);
    }

    match trimmed.split('-').collect::<Vec<_>>().as_slice() {
        [year] => Ok(vec![Period::year(parse_year(value, year)?)]),
        [a, b] => {
            let (start, end) = ordered(value, parse_year(value, a)?, parse_year(value, b)?)?;
            Ok((start..=end).map(Period::year).collect())
        }
        _ => Err(reject("more than one '-'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_year() {
        let periods = parse_datetime("2023").unwrap();
        assert_eq!(periods, vec![Period::year(2023)]);
        assert_eq!(periods[0].to_string(), "2023");
        assert_eq!(
            periods[0].search_range(),
            "2023-01-01T00:00:00Z/2023-12-31T23:59:59Z"
        );
    }

    #[test]
    fn dash_range_expands_per_year() {
        let periods = parse_datetime("2020-2022").unwrap();
        let labels: Vec<_> = periods.iter().map(Period::to_string).collect();
        assert_eq!(labels, ["2020", "2021", "2022"]);
    }

    #[test]
    fn slash_range_is_one_period() {
        let periods = parse_datetime("1990/2023").unwrap();
        assert_eq!(periods, vec![Period { start: 1990, end: 2023 }]);
        assert_eq!(periods[0].to_string(), "1990/2023");
        assert_eq!(periods[0].years().count(), 34);
    }

    #[test]
    fn rejected_forms() {
        for bad in ["2020,2021", "2020-2021-2022", "2023-01", "20", "2022-2020", "2020/2021/2022", "", "abcd"] {
            assert!(parse_datetime(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
