use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QreError, QreResult};

/// A single OHLCV bar at the data's native timeframe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An immutable, ascending-by-timestamp OHLCV bar table.
///
/// Constructed once per request and shared by reference across optimizer
/// workers; nothing after construction may mutate it.
#[derive(Debug, Clone, Default)]
pub struct OhlcvTable {
    bars: Vec<Bar>,
}

impl OhlcvTable {
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Bar> {
        self.bars.get(i)
    }

    /// Left-biased search: the index of the first bar whose timestamp is
    /// `>= ts`. Returns `len()` if every bar is strictly before `ts`.
    pub fn index_at_or_after(&self, ts: DateTime<Utc>) -> usize {
        self.bars.partition_point(|b| b.timestamp < ts)
    }

    /// The index of the last bar whose timestamp is `<= ts`, or `None` if
    /// every bar is strictly after `ts`.
    pub fn index_at_or_before(&self, ts: DateTime<Utc>) -> Option<usize> {
        let idx = self.bars.partition_point(|b| b.timestamp <= ts);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            bars: self.bars[start.min(self.bars.len())..end.min(self.bars.len())].to_vec(),
        }
    }
}

/// Resolve a caller-supplied CSV path against a configured set of allowed
/// root directories, rejecting anything that would escape them.
pub fn resolve_csv_path(path: &Path, allowed_roots: &[PathBuf]) -> QreResult<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|e| QreError::ResourceMissing(format!("cannot resolve {path:?}: {e}")))?;

    for root in allowed_roots {
        let root_canonical = match root.canonicalize() {
            Ok(r) => r,
            Err(_) => continue,
        };
        if canonical.starts_with(&root_canonical) {
            return Ok(canonical);
        }
    }

    Err(QreError::InputValidation(format!(
        "{path:?} is outside the configured allowed CSV roots"
    )))
}

/// Load an OHLCV CSV. Columns are matched case-insensitively; `time` is
/// seconds since the Unix epoch UTC; one of volume/Volume/vol/VOL must be
/// present. Rows are sorted ascending by timestamp; duplicate timestamps
/// keep the later row (last one wins, matching the order they appeared
/// on disk after the stable sort).
pub fn load_csv(path: &Path) -> QreResult<OhlcvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| QreError::ResourceMissing(format!("cannot open {path:?}: {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| QreError::InputValidation(format!("cannot read CSV header: {e}")))?
        .clone();

    let col_index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect();

    let time_idx = col_index
        .get("time")
        .copied()
        .ok_or_else(|| QreError::InputValidation("CSV missing required 'time' column".into()))?;
    let open_idx = require_col(&col_index, "open")?;
    let high_idx = require_col(&col_index, "high")?;
    let low_idx = require_col(&col_index, "low")?;
    let close_idx = require_col(&col_index, "close")?;
    let volume_idx = ["volume", "vol"]
        .iter()
        .find_map(|c| col_index.get(*c).copied())
        .ok_or_else(|| {
            QreError::InputValidation(
                "CSV missing required volume column (volume/Volume/vol/VOL)".into(),
            )
        })?;

    let mut by_timestamp: HashMap<i64, Bar> = HashMap::new();
    let mut order: Vec<i64> = Vec::new();

    for (row_num, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| QreError::InputValidation(format!("row {row_num}: {e}")))?;

        let secs: i64 = parse_field(&record, time_idx, "time")?;
        let open: f64 = parse_field(&record, open_idx, "open")?;
        let high: f64 = parse_field(&record, high_idx, "high")?;
        let low: f64 = parse_field(&record, low_idx, "low")?;
        let close: f64 = parse_field(&record, close_idx, "close")?;
        let volume: f64 = parse_field(&record, volume_idx, "volume")?;

        let timestamp = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| QreError::InputValidation(format!("row {row_num}: bad timestamp {secs}")))?;

        if !by_timestamp.contains_key(&secs) {
            order.push(secs);
        }
        by_timestamp.insert(
            secs,
            Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            },
        );
    }

    order.sort_unstable();
    let bars: Vec<Bar> = order.into_iter().map(|secs| by_timestamp[&secs]).collect();

    Ok(OhlcvTable::from_bars(bars))
}

fn require_col(index: &HashMap<String, usize>, name: &str) -> QreResult<usize> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| QreError::InputValidation(format!("CSV missing required '{name}' column")))
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
) -> QreResult<T> {
    record
        .get(idx)
        .ok_or_else(|| QreError::InputValidation(format!("missing value for '{name}'")))?
        .trim()
        .parse::<T>()
        .map_err(|_| QreError::InputValidation(format!("cannot parse '{name}' field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct TempCsv {
        path: std::path::PathBuf,
    }

    impl TempCsv {
        fn new(contents: &str) -> Self {
            let suffix = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .subsec_nanos();
            let path = std::env::temp_dir().join(format!("qre-core-test-{suffix}.csv"));
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(contents.as_bytes()).unwrap();
            Self { path }
        }
    }

    impl Drop for TempCsv {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[test]
    fn loads_and_sorts_and_dedups() {
        let csv = "time,open,high,low,close,Volume\n\
                    200,2,2,2,2,20\n\
                    100,1,1,1,1,10\n\
                    100,1.5,1.5,1.5,1.5,11\n";
        let tmp = TempCsv::new(csv);
        let table = load_csv(&tmp.path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().open, 1.5); // later duplicate wins
        assert_eq!(table.get(1).unwrap().open, 2.0);
    }

    #[test]
    fn missing_column_fails() {
        let csv = "time,open,high,low\n100,1,1,1\n";
        let tmp = TempCsv::new(csv);
        let err = load_csv(&tmp.path).unwrap_err();
        assert!(matches!(err, QreError::InputValidation(_)));
    }
}
