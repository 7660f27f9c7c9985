use chrono::{DateTime, Duration, Utc};
use qre_core::TradeRecord;

use crate::types::{TriggerType, WfaConfig};

/// A single fixed window's IS/OOS boundaries, before any adaptive truncation.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow {
    pub window_number: usize,
    pub is_start: DateTime<Utc>,
    pub is_end: DateTime<Utc>,
    pub oos_start: DateTime<Utc>,
    pub oos_end: DateTime<Utc>,
}

/// Roll fixed-length IS/OOS windows across `[trading_start, trading_end]`,
/// each shifted by `oos_period_days`. Stops once the next OOS end would
/// exceed `trading_end`.
pub fn fixed_windows(
    trading_start: DateTime<Utc>,
    trading_end: DateTime<Utc>,
    is_period_days: i64,
    oos_period_days: i64,
) -> Vec<FixedWindow> {
    let mut windows = Vec::new();
    let mut is_start = trading_start;
    let mut window_number = 1;

    loop {
        let is_end = is_start + Duration::days(is_period_days);
        let oos_end = is_end + Duration::days(oos_period_days);
        if oos_end > trading_end {
            break;
        }
        windows.push(FixedWindow { window_number, is_start, is_end, oos_start: is_end, oos_end });
        is_start += Duration::days(oos_period_days);
        window_number += 1;
    }

    windows
}

/// Outcome of scanning a provisional (max-length) OOS trade sequence for the
/// first adaptive trigger.
#[derive(Debug, Clone)]
pub struct AdaptiveTriggerOutcome {
    pub trigger_type: Option<TriggerType>,
    pub actual_oos_end: DateTime<Utc>,
    pub cusum_final: Option<f64>,
    pub dd_peak_pct: Option<f64>,
    pub trigger_trade_idx: Option<usize>,
}

fn mean_std(returns: &[f64]) -> Option<(f64, f64)> {
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std <= 0.0 {
        None
    } else {
        Some((mean, std))
    }
}

fn mean_interval(trades: &[TradeRecord]) -> Option<Duration> {
    if trades.len() < 2 {
        return None;
    }
    let total: Duration = trades.windows(2).map(|w| w[1].entry_time - w[0].entry_time).fold(Duration::zero(), |a, b| a + b);
    Some(total / (trades.len() as i32 - 1))
}

/// Scan a provisional OOS trade sequence (already run out to
/// `oos_max_end`) for the earliest satisfied trigger, per the CUSUM /
/// drawdown / inactivity rules. A trigger whose required inputs cannot be
/// computed (e.g. a single IS trade disables CUSUM and the mean-interval
/// check) is simply never raised.
pub fn scan_adaptive_trigger(
    is_trades: &[TradeRecord],
    is_max_drawdown_pct: f64,
    oos_start: DateTime<Utc>,
    oos_max_end: DateTime<Utc>,
    oos_trades: &[TradeRecord],
    config: &WfaConfig,
) -> AdaptiveTriggerOutcome {
    let is_returns: Vec<f64> = is_trades.iter().filter_map(|t| t.profit_pct).collect();
    let cusum_params = mean_std(&is_returns);
    let inactivity_threshold = mean_interval(is_trades).map(|d| {
        let nanos = d.num_nanoseconds().unwrap_or(0) as f64 * config.inactivity_multiplier;
        Duration::nanoseconds(nanos as i64)
    });

    let mut cusum = 0.0_f64;
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut dd_peak_pct = 0.0_f64;
    let mut prior_time = oos_start;

    for (idx, trade) in oos_trades.iter().enumerate() {
        if let Some(threshold) = inactivity_threshold {
            let gap = trade.entry_time - prior_time;
            if gap > threshold {
                return AdaptiveTriggerOutcome {
                    trigger_type: Some(TriggerType::Inactivity),
                    actual_oos_end: (prior_time + threshold).min(oos_max_end),
                    cusum_final: cusum_params.map(|_| cusum),
                    dd_peak_pct: Some(dd_peak_pct),
                    trigger_trade_idx: Some(idx),
                };
            }
        }

        let r = trade.profit_pct.unwrap_or(0.0) / 100.0;
        equity *= 1.0 + r;
        peak = peak.max(equity);
        let drawdown_pct = (peak - equity) / peak * 100.0;
        dd_peak_pct = dd_peak_pct.max(drawdown_pct);

        if drawdown_pct > config.dd_threshold_multiplier * is_max_drawdown_pct && is_max_drawdown_pct > 0.0 {
            return AdaptiveTriggerOutcome {
                trigger_type: Some(TriggerType::Drawdown),
                actual_oos_end: trade.exit_time,
                cusum_final: cusum_params.map(|_| cusum),
                dd_peak_pct: Some(dd_peak_pct),
                trigger_trade_idx: Some(idx),
            };
        }

        if let Some((mu, sigma)) = cusum_params {
            let trade_return = trade.profit_pct.unwrap_or(0.0);
            cusum = (cusum - (trade_return - mu) / sigma).max(0.0);

            let closed = idx + 1;
            if closed >= config.min_oos_trades
                && config.check_interval_trades > 0
                && (closed - config.min_oos_trades) % config.check_interval_trades == 0
                && cusum > config.cusum_threshold
            {
                return AdaptiveTriggerOutcome {
                    trigger_type: Some(TriggerType::Cusum),
                    actual_oos_end: trade.exit_time,
                    cusum_final: Some(cusum),
                    dd_peak_pct: Some(dd_peak_pct),
                    trigger_trade_idx: Some(idx),
                };
            }
        }

        prior_time = trade.exit_time;
    }

    if let Some(threshold) = inactivity_threshold {
        let gap = oos_max_end - prior_time;
        if gap > threshold {
            return AdaptiveTriggerOutcome {
                trigger_type: Some(TriggerType::Inactivity),
                actual_oos_end: (prior_time + threshold).min(oos_max_end),
                cusum_final: cusum_params.map(|_| cusum),
                dd_peak_pct: Some(dd_peak_pct),
                trigger_trade_idx: None,
            };
        }
    }

    AdaptiveTriggerOutcome {
        trigger_type: None,
        actual_oos_end: oos_max_end,
        cusum_final: cusum_params.map(|_| cusum),
        dd_peak_pct: Some(dd_peak_pct),
        trigger_trade_idx: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_windows_roll_by_oos_period() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let end = start + Duration::days(400);
        let windows = fixed_windows(start, end, 200, 100);
        assert!(windows.len() >= 2);
        assert_eq!(windows[1].is_start, windows[0].is_start + Duration::days(100));
    }

    #[test]
    fn fewer_than_two_windows_when_range_too_short() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let end = start + Duration::days(250);
        let windows = fixed_windows(start, end, 200, 100);
        assert!(windows.len() < 2);
    }

    #[test]
    fn no_trigger_when_oos_runs_clean() {
        let oos_start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let oos_max_end = oos_start + Duration::days(90);
        let config = WfaConfig::default();
        let outcome = scan_adaptive_trigger(&[], 5.0, oos_start, oos_max_end, &[], &config);
        assert!(outcome.trigger_type.is_none());
        assert_eq!(outcome.actual_oos_end, oos_max_end);
    }
}
