use crate::types::{WfaStitchedResult, WfaWindow};

/// Concatenate OOS equity across windows by compounding each window's own
/// bar-to-bar percentage change into a single stitched curve, then compute
/// stitched net profit / max drawdown / trade count / win rate / WFE.
pub fn stitch(windows: &[WfaWindow], adaptive_mode: bool) -> WfaStitchedResult {
    if windows.is_empty() {
        return WfaStitchedResult::default();
    }

    let mut stitched_equity = vec![1.0_f64];
    for window in windows {
        for pair in window.oos_equity_dense.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if prev.abs() > 1e-9 {
                let last = *stitched_equity.last().unwrap();
                stitched_equity.push(last * (cur / prev));
            }
        }
    }

    let mut peak = stitched_equity[0];
    let mut max_dd_pct = 0.0_f64;
    for &e in &stitched_equity {
        peak = peak.max(e);
        max_dd_pct = max_dd_pct.max((peak - e) / peak * 100.0);
    }

    let stitched_net_profit_pct = (stitched_equity.last().unwrap() / stitched_equity[0] - 1.0) * 100.0;
    let stitched_total_trades: i32 = windows.iter().map(|w| w.oos_metrics.total_trades).sum();
    let winning_windows = windows.iter().filter(|w| w.oos_metrics.net_profit_pct > 0.0).count();
    let oos_win_rate = winning_windows as f64 / windows.len() as f64 * 100.0;

    let wfe_pct = if adaptive_mode {
        duration_weighted_wfe(windows)
    } else {
        mean_annualized_wfe(windows)
    };

    WfaStitchedResult { stitched_net_profit_pct, stitched_max_drawdown_pct: max_dd_pct, stitched_total_trades, oos_win_rate, wfe_pct }
}

fn duration_weighted_wfe(windows: &[WfaWindow]) -> f64 {
    let sum_oos_profit: f64 = windows.iter().map(|w| w.oos_metrics.net_profit_pct).sum();
    let sum_oos_days: f64 = windows.iter().map(|w| w.adaptive.actual_oos_days as f64).sum::<f64>().max(1.0);
    let annualized_oos = sum_oos_profit / sum_oos_days * 365.0;

    let sum_is_profit: f64 = windows.iter().map(|w| w.is_metrics.net_profit_pct).sum();
    let sum_is_days: f64 = windows.iter().map(|w| (w.is_end - w.is_start).num_days().max(1) as f64).sum::<f64>().max(1.0);
    let annualized_is = sum_is_profit / sum_is_days * 365.0;

    if annualized_is.abs() > 1e-9 {
        annualized_oos / annualized_is * 100.0
    } else {
        0.0
    }
}

fn mean_annualized_wfe(windows: &[WfaWindow]) -> f64 {
    let n = windows.len() as f64;
    let avg_oos: f64 = windows
        .iter()
        .map(|w| {
            let days = (w.oos_end_actual - w.oos_start).num_days().max(1) as f64;
            w.oos_metrics.net_profit_pct / days * 365.0
        })
        .sum::<f64>()
        / n;
    let avg_is: f64 = windows
        .iter()
        .map(|w| {
            let days = (w.is_end - w.is_start).num_days().max(1) as f64;
            w.is_metrics.net_profit_pct / days * 365.0
        })
        .sum::<f64>()
        / n;

    if avg_is.abs() > 1e-9 {
        avg_oos / avg_is * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdaptiveTelemetry, BestParamsSource, SelectionChain};
    use chrono::{DateTime, Duration, Utc};
    use qre_core::BasicMetrics;

    fn window(is_days: i64, is_profit: f64, oos_days: i64, oos_profit: f64) -> WfaWindow {
        let is_start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let is_end = is_start + Duration::days(is_days);
        let oos_start = is_end;
        let oos_end = oos_start + Duration::days(oos_days);
        WfaWindow {
            window_number: 1,
            is_start,
            is_end,
            oos_start,
            oos_end_nominal: oos_end,
            oos_end_actual: oos_end,
            best_params: Default::default(),
            param_id: "s01-deadbeef".into(),
            selection_chain: SelectionChain::default(),
            best_params_source: BestParamsSource::Optuna,
            is_metrics: BasicMetrics { net_profit_pct: is_profit, ..Default::default() },
            oos_metrics: BasicMetrics { net_profit_pct: oos_profit, ..Default::default() },
            oos_equity_dense: Vec::new(),
            oos_equity_compact: Vec::new(),
            adaptive: AdaptiveTelemetry { actual_oos_days: oos_days, ..Default::default() },
        }
    }

    #[test]
    fn duration_weighted_wfe_matches_worked_example() {
        let windows = vec![window(90, 10.0, 10, 2.0), window(90, 10.0, 90, 6.0)];
        let wfe = duration_weighted_wfe(&windows);
        assert!((wfe - 72.0).abs() < 1.0, "got {wfe}");
    }
}
