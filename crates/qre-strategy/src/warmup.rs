use chrono::{DateTime, Utc};
use qre_core::OhlcvTable;

use crate::params::StrategyParams;

/// Minimum warmup window when none is requested explicitly: enough bars for
/// the longest moving average to settle, with a floor of 500 bars.
pub fn default_warmup_bars(params: &StrategyParams) -> usize {
    (params.longest_ma_length() as f64 * 1.5).ceil().max(500.0) as usize
}

/// Trim `table` to the warmup window plus the trading window, returning the
/// trimmed table and the index within it where trading (as opposed to
/// warmup) begins.
///
/// When both `start` and `end` are `None`, the whole table is returned
/// unmodified with a trade-start index of 0. Otherwise the trading window is
/// `[start, end]` (inclusive), left-padded by up to `warmup_bars` bars. If
/// `start` is after every bar, or `end` is before every bar, the result is
/// an empty table.
pub fn prepare_dataset_with_warmup(
    table: &OhlcvTable,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    warmup_bars: usize,
) -> (OhlcvTable, usize) {
    if start.is_none() && end.is_none() {
        return (table.clone(), 0);
    }

    let start_idx = match start {
        Some(s) => {
            let idx = table.index_at_or_after(s);
            if idx >= table.len() {
                return (OhlcvTable::from_bars(vec![]), 0);
            }
            idx
        }
        None => 0,
    };

    let end_idx = match end {
        Some(e) => match table.index_at_or_before(e) {
            Some(idx) => idx + 1,
            None => return (OhlcvTable::from_bars(vec![]), 0),
        },
        None => table.len(),
    };

    let warmup_start_idx = start_idx.saturating_sub(warmup_bars);
    let trimmed = table.slice(warmup_start_idx, end_idx);
    let trade_start_idx = start_idx - warmup_start_idx;

    (trimmed, trade_start_idx)
}

/// Convenience wrapper that derives the warmup window from the strategy's
/// own moving-average lengths rather than a caller-supplied bar count.
pub fn prepare_dataset_with_default_warmup(
    table: &OhlcvTable,
    params: &StrategyParams,
) -> (OhlcvTable, usize) {
    prepare_dataset_with_warmup(table, params.start, params.end, default_warmup_bars(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::Bar;

    fn table_of(n: i64) -> OhlcvTable {
        OhlcvTable::from_bars(
            (0..n)
                .map(|i| Bar {
                    timestamp: DateTime::<Utc>::from_timestamp(i * 60, 0).unwrap(),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 1.0,
                })
                .collect(),
        )
    }

    #[test]
    fn no_filter_returns_whole_table() {
        let table = table_of(10);
        let (trimmed, idx) = prepare_dataset_with_warmup(&table, None, None, 5);
        assert_eq!(trimmed.len(), 10);
        assert_eq!(idx, 0);
    }

    #[test]
    fn warmup_clamped_to_available_history() {
        let table = table_of(10);
        let start = DateTime::<Utc>::from_timestamp(3 * 60, 0).unwrap();
        let (trimmed, idx) = prepare_dataset_with_warmup(&table, Some(start), None, 100);
        assert_eq!(trimmed.len(), 10);
        assert_eq!(idx, 3);
    }

    #[test]
    fn start_after_all_data_is_empty() {
        let table = table_of(5);
        let start = DateTime::<Utc>::from_timestamp(1000, 0).unwrap();
        let (trimmed, idx) = prepare_dataset_with_warmup(&table, Some(start), None, 10);
        assert!(trimmed.is_empty());
        assert_eq!(idx, 0);
    }
}
