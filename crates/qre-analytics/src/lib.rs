use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: f64 = 86400.0;
const SHORT_SPAN_DAYS: f64 = 30.0;

pub const WARNING_NO_VALID_DATA: &str = "No valid equity data found for selected studies.";
pub const WARNING_NO_OVERLAP: &str = "Selected studies have no overlapping time period.";

/// One study's stitched equity curve, as stored alongside a `wfa_windows`
/// row or an optimization study's best-trial replay.
#[derive(Debug, Clone)]
pub struct StudyCurve {
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

struct NormalizedCurve {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

/// Sort by timestamp, collapse same-timestamp points to the latest value,
/// and require at least two finite points. Matches the leniency of the
/// portfolio aggregator: a malformed study is excluded, not fatal.
fn normalize_study_curve(curve: &StudyCurve) -> Option<NormalizedCurve> {
    if curve.values.len() < 2 || curve.values.len() != curve.timestamps.len() {
        return None;
    }

    let mut pairs: Vec<(DateTime<Utc>, f64)> = curve.timestamps.iter().copied().zip(curve.values.iter().copied()).collect();
    if pairs.iter().any(|(_, v)| !v.is_finite()) {
        return None;
    }
    pairs.sort_by_key(|(ts, _)| *ts);

    let mut deduped: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(pairs.len());
    for (ts, value) in pairs {
        if let Some(last) = deduped.last_mut() {
            if last.0 == ts {
                *last = (ts, value);
                continue;
            }
        }
        deduped.push((ts, value));
    }

    if deduped.len() < 2 {
        return None;
    }

    Some(NormalizedCurve { timestamps: deduped.iter().map(|(ts, _)| *ts).collect(), values: deduped.iter().map(|(_, v)| *v).collect() })
}

fn build_time_grid(studies: &[NormalizedCurve], t_start: DateTime<Utc>, t_end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut grid: Vec<DateTime<Utc>> = vec![t_start, t_end];
    for study in studies {
        for ts in &study.timestamps {
            if *ts >= t_start && *ts <= t_end {
                grid.push(*ts);
            }
        }
    }
    grid.sort();
    grid.dedup();
    grid
}

/// Step-interpolate `source` onto `targets`: each target takes the value of
/// the latest source point at or before it.
fn forward_fill(source_timestamps: &[DateTime<Utc>], source_values: &[f64], targets: &[DateTime<Utc>]) -> Vec<f64> {
    let mut result = Vec::with_capacity(targets.len());
    let mut src_idx = 0;
    let src_last = source_timestamps.len() - 1;

    for target in targets {
        while src_idx < src_last && source_timestamps[src_idx + 1] <= *target {
            src_idx += 1;
        }
        result.push(source_values[src_idx]);
    }
    result
}

fn compute_max_drawdown(curve: &[f64]) -> f64 {
    let Some(&first) = curve.first() else { return 0.0 };
    let mut peak = first;
    let mut max_dd = 0.0;
    for &value in curve {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let drawdown = (peak - value) / peak * 100.0;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }
    }
    max_dd
}

fn annualize_profit(profit_pct: f64, span_days: f64) -> Option<f64> {
    if !profit_pct.is_finite() || !span_days.is_finite() || span_days <= SHORT_SPAN_DAYS {
        return None;
    }
    let return_multiple = 1.0 + profit_pct / 100.0;
    if return_multiple <= 0.0 {
        return None;
    }
    let ann = (return_multiple.powf(365.0 / span_days) - 1.0) * 100.0;
    ann.is_finite().then_some(ann)
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub curve: Option<Vec<f64>>,
    pub timestamps: Option<Vec<DateTime<Utc>>>,
    pub profit_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub ann_profit_pct: Option<f64>,
    pub overlap_days: i64,
    pub overlap_days_exact: f64,
    pub studies_used: usize,
    pub studies_excluded: usize,
    pub warning: Option<String>,
}

impl AggregateResult {
    fn empty(warning: &str, studies_used: usize, studies_excluded: usize) -> Self {
        Self {
            curve: None,
            timestamps: None,
            profit_pct: None,
            max_drawdown_pct: None,
            ann_profit_pct: None,
            overlap_days: 0,
            overlap_days_exact: 0.0,
            studies_used,
            studies_excluded,
            warning: Some(warning.to_string()),
        }
    }
}

/// Equal-weight portfolio aggregation over N studies' stitched equity
/// curves: align onto the common time grid, forward-fill, reject any study
/// whose aligned start is non-positive, normalize to 100 at the aligned
/// start, and average. Never errors; unusable input surfaces as a warning.
pub fn aggregate_equity_curves(studies: &[StudyCurve]) -> AggregateResult {
    let mut valid = Vec::new();
    let mut excluded = 0usize;

    for study in studies {
        match normalize_study_curve(study) {
            Some(normalized) => valid.push(normalized),
            None => excluded += 1,
        }
    }

    if valid.is_empty() {
        return AggregateResult::empty(WARNING_NO_VALID_DATA, 0, excluded);
    }

    let t_start = valid.iter().map(|s| s.timestamps[0]).max().unwrap();
    let t_end = valid.iter().map(|s| *s.timestamps.last().unwrap()).min().unwrap();
    if t_start >= t_end {
        return AggregateResult::empty(WARNING_NO_OVERLAP, valid.len(), excluded);
    }

    let time_grid = build_time_grid(&valid, t_start, t_end);
    if time_grid.len() < 2 {
        return AggregateResult::empty(WARNING_NO_OVERLAP, valid.len(), excluded);
    }

    let mut aligned_curves: Vec<Vec<f64>> = Vec::new();
    for study in &valid {
        let filled = forward_fill(&study.timestamps, &study.values, &time_grid);
        let start_value = filled[0];
        if start_value <= 0.0 || !start_value.is_finite() {
            excluded += 1;
            continue;
        }
        aligned_curves.push(filled.iter().map(|v| v / start_value * 100.0).collect());
    }

    if aligned_curves.is_empty() {
        return AggregateResult::empty(WARNING_NO_VALID_DATA, 0, excluded);
    }

    let grid_size = time_grid.len();
    let curve_count = aligned_curves.len() as f64;
    let portfolio: Vec<f64> =
        (0..grid_size).map(|idx| round6(aligned_curves.iter().map(|c| c[idx]).sum::<f64>() / curve_count)).collect();

    let profit_pct = (portfolio.last().unwrap() / 100.0 - 1.0) * 100.0;
    let max_drawdown_pct = compute_max_drawdown(&portfolio);

    let span_days_exact = (t_end - t_start).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    let overlap_days = span_days_exact.floor().max(0.0) as i64;
    let ann_profit_pct = annualize_profit(profit_pct, span_days_exact);

    let warning = (span_days_exact <= SHORT_SPAN_DAYS)
        .then(|| format!("Short overlapping period ({} days) - annualized metric is suppressed.", span_days_exact.round() as i64));

    AggregateResult {
        curve: Some(portfolio),
        timestamps: Some(time_grid),
        profit_pct: Some(round4(profit_pct)),
        max_drawdown_pct: Some(round4(max_drawdown_pct)),
        ann_profit_pct: ann_profit_pct.map(round2),
        overlap_days,
        overlap_days_exact: round6(span_days_exact),
        studies_used: aligned_curves.len(),
        studies_excluded: excluded,
        warning,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
fn round2(value: f64) -> f64 {
    round_to(value, 2)
}
fn round4(value: f64) -> f64 {
    round_to(value, 4)
}
fn round6(value: f64) -> f64 {
    round_to(value, 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day)
    }

    #[test]
    fn averages_two_studies_normalized_to_100_at_overlap_start() {
        let a = StudyCurve { timestamps: (0..60).map(ts).collect(), values: (0..60).map(|i| 100.0 + i as f64).collect() };
        let b = StudyCurve { timestamps: (10..70).map(ts).collect(), values: (10..70).map(|i| 200.0 + i as f64 * 2.0).collect() };

        let result = aggregate_equity_curves(&[a, b]);
        assert!(result.warning.is_none());
        assert_eq!(result.studies_used, 2);
        let curve = result.curve.unwrap();
        assert!((curve[0] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn no_overlap_produces_a_warning_not_an_error() {
        let a = StudyCurve { timestamps: (0..10).map(ts).collect(), values: (0..10).map(|i| 100.0 + i as f64).collect() };
        let b = StudyCurve { timestamps: (20..30).map(ts).collect(), values: (20..30).map(|i| 100.0 + i as f64).collect() };

        let result = aggregate_equity_curves(&[a, b]);
        assert_eq!(result.warning.as_deref(), Some(WARNING_NO_OVERLAP));
        assert!(result.curve.is_none());
    }

    #[test]
    fn degenerate_single_point_curve_is_excluded_not_fatal() {
        let degenerate = StudyCurve { timestamps: vec![ts(0)], values: vec![100.0] };
        let healthy = StudyCurve { timestamps: (0..40).map(ts).collect(), values: (0..40).map(|i| 100.0 + i as f64).collect() };

        let result = aggregate_equity_curves(&[degenerate, healthy]);
        assert_eq!(result.studies_used, 1);
        assert_eq!(result.studies_excluded, 1);
        assert!(result.curve.is_some());
    }

    #[test]
    fn short_overlap_suppresses_annualized_profit() {
        let a = StudyCurve { timestamps: (0..10).map(ts).collect(), values: (0..10).map(|i| 100.0 + i as f64).collect() };
        let b = StudyCurve { timestamps: (0..10).map(ts).collect(), values: (0..10).map(|i| 100.0 + i as f64 * 2.0).collect() };

        let result = aggregate_equity_curves(&[a, b]);
        assert!(result.ann_profit_pct.is_none());
        assert!(result.warning.is_some());
    }
}
