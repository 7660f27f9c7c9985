use qre_core::{BasicMetrics, StrategyResult};

/// Net profit, drawdown, and trade-count statistics derived from the
/// mark-to-market equity curve and the closed trade ledger.
pub fn calculate_basic(result: &StrategyResult, initial_balance: f64) -> BasicMetrics {
    let final_balance = result.balance_curve.last().copied().unwrap_or(initial_balance);
    let net_profit = final_balance - initial_balance;
    let net_profit_pct = if initial_balance != 0.0 {
        net_profit / initial_balance * 100.0
    } else {
        0.0
    };

    let max_drawdown_pct = max_drawdown_pct(&result.equity_curve);

    let total_trades = result.trades.len() as i32;
    let winning_trades = result.trades.iter().filter(|t| t.net_pnl > 0.0).count() as i32;
    let losing_trades = total_trades - winning_trades;
    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let gross_profit = result.trades.iter().filter(|t| t.net_pnl > 0.0).map(|t| t.net_pnl).sum();
    let gross_loss = result
        .trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();

    let max_consecutive_losses = max_consecutive_losses(result);

    BasicMetrics {
        net_profit,
        net_profit_pct,
        max_drawdown_pct,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        max_consecutive_losses,
        gross_profit,
        gross_loss,
    }
}

/// Maximum peak-to-trough decline of `curve`, expressed as a percentage.
pub fn max_drawdown_pct(curve: &[f64]) -> f64 {
    if curve.is_empty() {
        return 0.0;
    }
    let mut peak = curve[0];
    let mut max_dd = 0.0_f64;
    for &v in curve {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd * 100.0
}

fn max_consecutive_losses(result: &StrategyResult) -> i32 {
    let mut max_streak = 0;
    let mut streak = 0;
    for t in &result.trades {
        if t.net_pnl < 0.0 {
            streak += 1;
            max_streak = max_streak.max(streak);
        } else {
            streak = 0;
        }
    }
    max_streak
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
    fn counts_wins_and_losses() {
        let mut result = StrategyResult::empty();
        result.trades = vec![trade(10.0), trade(-5.0), trade(-3.0), trade(8.0)];
        result.balance_curve = vec![100.0, 110.0, 105.0, 102.0, 110.0];
        result.equity_curve = result.balance_curve.clone();
        let basic = calculate_basic(&result, 100.0);
        assert_eq!(basic.total_trades, 4);
        assert_eq!(basic.winning_trades, 2);
        assert_eq!(basic.losing_trades, 2);
        assert_eq!(basic.max_consecutive_losses, 2);
        assert!((basic.gross_profit - 18.0).abs() < 1e-9);
        assert!((basic.gross_loss - 8.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_tracks_peak_decline() {
        let curve = vec![100.0, 120.0, 90.0, 110.0];
        assert!((max_drawdown_pct(&curve) - 25.0).abs() < 1e-9);
    }
}
