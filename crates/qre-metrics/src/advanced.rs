use qre_core::{AdvancedMetrics, StrategyResult};

use crate::basic::max_drawdown_pct;

const TRADING_PERIODS_PER_YEAR: f64 = 252.0;

/// Sharpe, Sortino, profit factor, RoMaD, Ulcer Index, SQN, consistency and
/// recovery factor, derived from the mark-to-market equity curve and the
/// closed trade ledger.
pub fn calculate_advanced(result: &StrategyResult, initial_balance: f64, risk_free_rate: f64) -> AdvancedMetrics {
    let (sharpe_ratio, sortino_ratio) = risk_ratios(&result.equity_curve, risk_free_rate);

    let gross_profit: f64 = result.trades.iter().filter(|t| t.net_pnl > 0.0).map(|t| t.net_pnl).sum();
    let gross_loss: f64 = result
        .trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        Some(f64::INFINITY)
    } else {
        None
    };

    let max_dd_pct = max_drawdown_pct(&result.equity_curve);
    let final_balance = result.balance_curve.last().copied().unwrap_or(initial_balance);
    let net_profit = final_balance - initial_balance;
    let net_profit_pct = if initial_balance != 0.0 { net_profit / initial_balance * 100.0 } else { 0.0 };

    let romad = if max_dd_pct > 0.0 { Some(net_profit_pct / max_dd_pct) } else { None };

    // Recovery factor is a dollar-terms ratio, distinct from RoMaD's
    // percentage terms: it needs the equity curve's actual peak-to-trough
    // decline, not a reconstruction of it from `max_dd_pct` and
    // `initial_balance` (those only agree when the curve's peak happens to
    // equal `initial_balance`, which a rally before the worst drawdown breaks).
    let max_dd_abs = max_drawdown_abs(&result.equity_curve);
    let recovery_factor = if max_dd_abs > 0.0 { Some(net_profit / max_dd_abs) } else { None };

    let ulcer_index = ulcer_index(&result.equity_curve);
    let sqn = system_quality_number(result);
    let consistency_score = consistency_score(result);

    AdvancedMetrics {
        sharpe_ratio,
        sortino_ratio,
        profit_factor,
        romad,
        ulcer_index,
        sqn,
        consistency_score,
        recovery_factor,
    }
}

fn period_returns(curve: &[f64]) -> Vec<f64> {
    curve
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] / w[0]) - 1.0)
        .collect()
}

fn risk_ratios(curve: &[f64], annual_risk_free_rate: f64) -> (Option<f64>, Option<f64>) {
    let returns = period_returns(curve);
    if returns.len() < 2 {
        return (None, None);
    }
    let rf_period = annual_risk_free_rate / TRADING_PERIODS_PER_YEAR;
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let sharpe = if std_dev > 0.0 {
        Some(((mean - rf_period) / std_dev) * TRADING_PERIODS_PER_YEAR.sqrt())
    } else {
        None
    };

    let downside: Vec<f64> = returns.iter().filter(|r| **r < rf_period).map(|r| (r - rf_period).powi(2)).collect();
    let downside_dev = if !downside.is_empty() {
        (downside.iter().sum::<f64>() / downside.len() as f64).sqrt()
    } else {
        0.0
    };
    let sortino = if downside_dev > 0.0 {
        Some(((mean - rf_period) / downside_dev) * TRADING_PERIODS_PER_YEAR.sqrt())
    } else {
        sharpe
    };

    (sharpe, sortino)
}

/// Largest peak-to-trough decline in the curve's own units (dollars, not
/// percent). Distinct from `max_drawdown_pct`, which normalizes each
/// drawdown by the peak it fell from before taking the max.
fn max_drawdown_abs(curve: &[f64]) -> f64 {
    let mut peak = curve.first().copied().unwrap_or(0.0);
    let mut worst = 0.0_f64;
    for &v in curve {
        if v > peak {
            peak = v;
        }
        worst = worst.max(peak - v);
    }
    worst
}

/// Root-mean-square of percentage drawdown below the running peak: penalizes
/// depth and duration of drawdowns, unlike max drawdown which only captures depth.
fn ulcer_index(curve: &[f64]) -> Option<f64> {
    if curve.is_empty() {
        return None;
    }
    let mut peak = curve[0];
    let mut sum_sq = 0.0;
    for &v in curve {
        if v > peak {
            peak = v;
        }
        let dd_pct = if peak > 0.0 { (peak - v) / peak * 100.0 } else { 0.0 };
        sum_sq += dd_pct * dd_pct;
    }
    Some((sum_sq / curve.len() as f64).sqrt())
}

/// System Quality Number: `sqrt(n) * mean(trade R) / stddev(trade R)`.
fn system_quality_number(result: &StrategyResult) -> Option<f64> {
    let n = result.trades.len();
    if n < 2 {
        return None;
    }
    let pnls: Vec<f64> = result.trades.iter().map(|t| t.net_pnl).collect();
    let mean = pnls.iter().sum::<f64>() / n as f64;
    let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        Some((n as f64).sqrt() * mean / std_dev)
    } else {
        None
    }
}

/// Percentage of calendar months in which the balance curve ended higher
/// than it started.
fn consistency_score(result: &StrategyResult) -> Option<f64> {
    if result.timestamps.len() != result.balance_curve.len() || result.timestamps.is_empty() {
        return None;
    }

    let mut months: Vec<(i32, u32)> = Vec::new();
    let mut month_first_last: Vec<(f64, f64)> = Vec::new();

    for (ts, &bal) in result.timestamps.iter().zip(result.balance_curve.iter()) {
        use chrono::Datelike;
        let key = (ts.year(), ts.month());
        if months.last() == Some(&key) {
            let last = month_first_last.last_mut().unwrap();
            last.1 = bal;
        } else {
            months.push(key);
            month_first_last.push((bal, bal));
        }
    }

    if months.is_empty() {
        return None;
    }

    let profitable = month_first_last.iter().filter(|(first, last)| last > first).count();
    Some(profitable as f64 / months.len() as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use qre_core::{Direction, TradeRecord};

    fn trade(pnl: f64) -> TradeRecord {
        let t = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        TradeRecord {
            direction: Direction::Long,
            entry_time: t,
            exit_time: t,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            size: 1.0,
            net_pnl: pnl,
            profit_pct: Some(pnl),
        }
    }

    #[test]
    fn sqn_requires_at_least_two_trades() {
        let mut result = StrategyResult::empty();
        result.trades = vec![trade(5.0)];
        assert!(system_quality_number(&result).is_none());
        result.trades.push(trade(-2.0));
        assert!(system_quality_number(&result).is_some());
    }

    #[test]
    fn ulcer_index_is_zero_for_monotonic_curve() {
        let curve = vec![100.0, 110.0, 120.0, 130.0];
        let ui = ulcer_index(&curve).unwrap();
        assert!(ui.abs() < 1e-9);
    }

    #[test]
    fn profit_factor_infinite_with_no_losses() {
        let mut result = StrategyResult::empty();
        result.trades = vec![trade(5.0), trade(3.0)];
        result.equity_curve = vec![100.0, 105.0, 108.0];
        result.balance_curve = result.equity_curve.clone();
        let adv = calculate_advanced(&result, 100.0, 0.02);
        assert_eq!(adv.profit_factor, Some(f64::INFINITY));
    }

    #[test]
    fn recovery_factor_uses_absolute_drawdown_not_romad() {
        let mut result = StrategyResult::empty();
        result.equity_curve = vec![100.0, 1000.0, 500.0, 600.0];
        result.balance_curve = result.equity_curve.clone();
        result.trades = vec![trade(500.0)];

        let adv = calculate_advanced(&result, 100.0, 0.02);

        assert!((max_drawdown_abs(&result.equity_curve) - 500.0).abs() < 1e-9);
        let recovery_factor = adv.recovery_factor.unwrap();
        assert!((recovery_factor - 1.0).abs() < 1e-9, "expected 1.0, got {recovery_factor}");
        assert_ne!(recovery_factor, adv.romad.unwrap());
    }
}
