use qre_core::{Direction, OhlcvTable, QreResult, StrategyResult, TradeRecord};
use qre_indicators::{atr, get_ma};
use qre_metrics::enrich_strategy_result;

use crate::params::StrategyParams;

const INITIAL_BALANCE: f64 = 100.0;
const RISK_FREE_RATE: f64 = 0.02;

/// Controls how much of a trade's unrealized P&L is blended into the
/// displayed mark-to-market curve. `1.0` (the default) mirrors the
/// canonical engine, which marks the whole open position to market every
/// bar; values below that dampen intrabar noise in the displayed equity
/// curve without touching the realized balance curve used for sizing.
#[derive(Debug, Clone, Copy)]
pub struct BalanceMixer {
    pub unrealized_fraction: f64,
}

impl Default for BalanceMixer {
    fn default() -> Self {
        Self { unrealized_fraction: 1.0 }
    }
}

/// Rolling min/max with `min_periods = 1`: the first `period - 1` windows
/// are partial rather than `NaN`.
fn rolling_min(data: &[f64], period: usize) -> Vec<f64> {
    (0..data.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            data[start..=i].iter().copied().fold(f64::INFINITY, f64::min)
        })
        .collect()
}

fn rolling_max(data: &[f64], period: usize) -> Vec<f64> {
    (0..data.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            data[start..=i].iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

struct LongState {
    position_size: f64,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
    trail_price: f64,
    trail_activated: bool,
    entry_time: Option<chrono::DateTime<chrono::Utc>>,
    entry_commission: f64,
}

impl Default for LongState {
    fn default() -> Self {
        Self {
            position_size: 0.0,
            entry_price: f64::NAN,
            stop_price: f64::NAN,
            target_price: f64::NAN,
            trail_price: f64::NAN,
            trail_activated: false,
            entry_time: None,
            entry_commission: 0.0,
        }
    }
}

struct ShortState {
    position_size: f64,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
    trail_price: f64,
    trail_activated: bool,
    entry_time: Option<chrono::DateTime<chrono::Utc>>,
    entry_commission: f64,
}

impl Default for ShortState {
    fn default() -> Self {
        Self {
            position_size: 0.0,
            entry_price: f64::NAN,
            stop_price: f64::NAN,
            target_price: f64::NAN,
            trail_price: f64::NAN,
            trail_activated: false,
            entry_time: None,
            entry_commission: 0.0,
        }
    }
}

/// Run the trailing-MA trend strategy over `table`, treating bars before
/// `trade_start_idx` as warmup: indicators see them, but no new position may
/// open until the index reaches `trade_start_idx` (when `use_date_filter` is
/// set).
pub fn run(
    table: &OhlcvTable,
    params: &StrategyParams,
    trade_start_idx: usize,
    mixer: BalanceMixer,
) -> QreResult<StrategyResult> {
    let bars = table.bars();
    if bars.is_empty() {
        return Ok(StrategyResult::empty());
    }

    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let ma_series = get_ma(&close, bars, params.ma_type, params.ma_length);
    let atr_series = atr(bars, params.atr_period);
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lowest_long = rolling_min(&lows, params.stop_long_lp);
    let highest_short = rolling_max(&highs, params.stop_short_lp);

    let mut trail_ma_long = get_ma(&close, bars, params.trail_ma_long_type, params.trail_ma_long_length);
    let mut trail_ma_short = get_ma(&close, bars, params.trail_ma_short_type, params.trail_ma_short_length);
    if params.trail_ma_long_length > 0 {
        for v in trail_ma_long.iter_mut() {
            *v *= 1.0 + params.trail_ma_long_offset_pct / 100.0;
        }
    }
    if params.trail_ma_short_length > 0 {
        for v in trail_ma_short.iter_mut() {
            *v *= 1.0 + params.trail_ma_short_offset_pct / 100.0;
        }
    }

    let mut realized_equity = INITIAL_BALANCE;
    let mut position: i8 = 0;
    let mut prev_position: i8 = 0;

    let mut long = LongState::default();
    let mut short = ShortState::default();

    let mut counter_close_trend_long: i64 = 0;
    let mut counter_close_trend_short: i64 = 0;

    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut realized_curve: Vec<f64> = Vec::with_capacity(bars.len());
    let mut mtm_curve: Vec<f64> = Vec::with_capacity(bars.len());

    for i in 0..bars.len() {
        let bar = &bars[i];
        let c = bar.close;
        let h = bar.high;
        let l = bar.low;
        let ma_value = ma_series[i];
        let atr_value = atr_series[i];
        let lowest_value = lowest_long[i];
        let highest_value = highest_short[i];
        let trail_long_value = trail_ma_long[i];
        let trail_short_value = trail_ma_short[i];

        if ma_value.is_finite() {
            if c > ma_value {
                counter_close_trend_long += 1;
                counter_close_trend_short = 0;
            } else if c < ma_value {
                counter_close_trend_short += 1;
                counter_close_trend_long = 0;
            } else {
                counter_close_trend_long = 0;
                counter_close_trend_short = 0;
            }
        }

        let (counter_trade_long, counter_trade_short) = match position {
            p if p > 0 => (1, 0),
            p if p < 0 => (0, 1),
            _ => (0, 0),
        };

        let mut exit_price: Option<f64> = None;

        if position > 0 {
            if !long.trail_activated && long.entry_price.is_finite() && long.stop_price.is_finite() {
                let activation = long.entry_price + (long.entry_price - long.stop_price) * params.trail_rr_long;
                if h >= activation {
                    long.trail_activated = true;
                    if !long.trail_price.is_finite() {
                        long.trail_price = long.stop_price;
                    }
                }
            }
            if long.trail_price.is_finite() && trail_long_value.is_finite() && trail_long_value > long.trail_price {
                long.trail_price = trail_long_value;
            }
            if long.trail_activated {
                if long.trail_price.is_finite() && l <= long.trail_price {
                    exit_price = Some(if long.trail_price > h { h } else { long.trail_price });
                }
            } else if l <= long.stop_price {
                exit_price = Some(long.stop_price);
            } else if h >= long.target_price {
                exit_price = Some(long.target_price);
            }
            if exit_price.is_none() && params.stop_long_max_days > 0 {
                if let Some(entry_time) = long.entry_time {
                    let days = (bar.timestamp - entry_time).num_seconds() / 86_400;
                    if days >= params.stop_long_max_days {
                        exit_price = Some(c);
                    }
                }
            }
            if let Some(exit_price) = exit_price {
                let gross_pnl = (exit_price - long.entry_price) * long.position_size;
                let exit_commission = exit_price * long.position_size * params.commission_rate;
                let net_pnl = gross_pnl - exit_commission - long.entry_commission;
                realized_equity += gross_pnl - exit_commission;
                let entry_value = long.entry_price * long.position_size;
                let profit_pct = if entry_value != 0.0 { Some(net_pnl / entry_value * 100.0) } else { None };
                trades.push(TradeRecord {
                    direction: Direction::Long,
                    entry_time: long.entry_time.unwrap_or(bar.timestamp),
                    exit_time: bar.timestamp,
                    entry_price: long.entry_price,
                    exit_price,
                    size: long.position_size,
                    net_pnl,
                    profit_pct,
                });
                position = 0;
                long = LongState::default();
            }
        } else if position < 0 {
            if !short.trail_activated && short.entry_price.is_finite() && short.stop_price.is_finite() {
                let activation = short.entry_price - (short.stop_price - short.entry_price) * params.trail_rr_short;
                if l <= activation {
                    short.trail_activated = true;
                    if !short.trail_price.is_finite() {
                        short.trail_price = short.stop_price;
                    }
                }
            }
            if short.trail_price.is_finite() && trail_short_value.is_finite() && trail_short_value < short.trail_price {
                short.trail_price = trail_short_value;
            }
            if short.trail_activated {
                if short.trail_price.is_finite() && h >= short.trail_price {
                    exit_price = Some(if short.trail_price < l { l } else { short.trail_price });
                }
            } else if h >= short.stop_price {
                exit_price = Some(short.stop_price);
            } else if l <= short.target_price {
                exit_price = Some(short.target_price);
            }
            if exit_price.is_none() && params.stop_short_max_days > 0 {
                if let Some(entry_time) = short.entry_time {
                    let days = (bar.timestamp - entry_time).num_seconds() / 86_400;
                    if days >= params.stop_short_max_days {
                        exit_price = Some(c);
                    }
                }
            }
            if let Some(exit_price) = exit_price {
                let gross_pnl = (short.entry_price - exit_price) * short.position_size;
                let exit_commission = exit_price * short.position_size * params.commission_rate;
                let net_pnl = gross_pnl - exit_commission - short.entry_commission;
                realized_equity += gross_pnl - exit_commission;
                let entry_value = short.entry_price * short.position_size;
                let profit_pct = if entry_value != 0.0 { Some(net_pnl / entry_value * 100.0) } else { None };
                trades.push(TradeRecord {
                    direction: Direction::Short,
                    entry_time: short.entry_time.unwrap_or(bar.timestamp),
                    exit_time: bar.timestamp,
                    entry_price: short.entry_price,
                    exit_price,
                    size: short.position_size,
                    net_pnl,
                    profit_pct,
                });
                position = 0;
                short = ShortState::default();
            }
        }

        let up_trend = counter_close_trend_long >= params.close_count_long && counter_trade_long == 0;
        let down_trend = counter_close_trend_short >= params.close_count_short && counter_trade_short == 0;

        let time_in_range = !params.use_date_filter || i >= trade_start_idx;

        let can_open_long =
            up_trend && position == 0 && prev_position == 0 && time_in_range && atr_value.is_finite() && lowest_value.is_finite();
        let can_open_short =
            down_trend && position == 0 && prev_position == 0 && time_in_range && atr_value.is_finite() && highest_value.is_finite();

        if can_open_long {
            let stop_size = atr_value * params.stop_long_atr;
            let long_stop_price = lowest_value - stop_size;
            let long_stop_distance = c - long_stop_price;
            if long_stop_distance > 0.0 {
                let long_stop_pct = long_stop_distance / c * 100.0;
                if long_stop_pct <= params.stop_long_max_pct || params.stop_long_max_pct <= 0.0 {
                    let risk_cash = realized_equity * (params.risk_per_trade_pct / 100.0);
                    let mut qty = if long_stop_distance != 0.0 { risk_cash / long_stop_distance } else { 0.0 };
                    if params.contract_size > 0.0 {
                        qty = (qty / params.contract_size).floor() * params.contract_size;
                    }
                    if qty > 0.0 {
                        position = 1;
                        long.position_size = qty;
                        long.entry_price = c;
                        long.stop_price = long_stop_price;
                        long.target_price = c + long_stop_distance * params.stop_long_rr;
                        long.trail_price = long_stop_price;
                        long.trail_activated = false;
                        long.entry_time = Some(bar.timestamp);
                        long.entry_commission = long.entry_price * long.position_size * params.commission_rate;
                        realized_equity -= long.entry_commission;
                    }
                }
            }
        }

        if can_open_short && position == 0 {
            let stop_size = atr_value * params.stop_short_atr;
            let short_stop_price = highest_value + stop_size;
            let short_stop_distance = short_stop_price - c;
            if short_stop_distance > 0.0 {
                let short_stop_pct = short_stop_distance / c * 100.0;
                if short_stop_pct <= params.stop_short_max_pct || params.stop_short_max_pct <= 0.0 {
                    let risk_cash = realized_equity * (params.risk_per_trade_pct / 100.0);
                    let mut qty = if short_stop_distance != 0.0 { risk_cash / short_stop_distance } else { 0.0 };
                    if params.contract_size > 0.0 {
                        qty = (qty / params.contract_size).floor() * params.contract_size;
                    }
                    if qty > 0.0 {
                        position = -1;
                        short.position_size = qty;
                        short.entry_price = c;
                        short.stop_price = short_stop_price;
                        short.target_price = c - short_stop_distance * params.stop_short_rr;
                        short.trail_price = short_stop_price;
                        short.trail_activated = false;
                        short.entry_time = Some(bar.timestamp);
                        short.entry_commission = short.entry_price * short.position_size * params.commission_rate;
                        realized_equity -= short.entry_commission;
                    }
                }
            }
        }

        let mut mark_to_market = realized_equity;
        if position > 0 && long.entry_price.is_finite() {
            mark_to_market += (c - long.entry_price) * long.position_size * mixer.unrealized_fraction;
        } else if position < 0 && short.entry_price.is_finite() {
            mark_to_market += (short.entry_price - c) * short.position_size * mixer.unrealized_fraction;
        }

        realized_curve.push(realized_equity);
        mtm_curve.push(mark_to_market);
        prev_position = position;
    }

    let timestamps = bars.iter().map(|b| b.timestamp).collect();

    let result = StrategyResult {
        trades,
        equity_curve: mtm_curve,
        balance_curve: realized_curve,
        timestamps,
        basic: Default::default(),
        advanced: Default::default(),
    };

    Ok(enrich_strategy_result(result, INITIAL_BALANCE, RISK_FREE_RATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use qre_core::Bar;

    fn synthetic_table(n: usize) -> OhlcvTable {
        let mut bars = Vec::with_capacity(n);
        let mut price = 100.0_f64;
        for i in 0..n {
            price += ((i as f64) * 0.3).sin() * 0.5 + 0.05;
            bars.push(Bar {
                timestamp: DateTime::<Utc>::from_timestamp(i as i64 * 3600, 0).unwrap(),
                open: price,
                high: price + 1.0,
                low: price - 1.0,
                close: price,
                volume: 100.0,
            });
        }
        OhlcvTable::from_bars(bars)
    }

    #[test]
    fn run_produces_aligned_curves() {
        let table = synthetic_table(400);
        let params = StrategyParams {
            use_date_filter: false,
            ma_length: 10,
            trail_ma_long_length: 10,
            trail_ma_short_length: 10,
            close_count_long: 2,
            close_count_short: 2,
            ..StrategyParams::default()
        };
        let result = run(&table, &params, 0, BalanceMixer::default()).unwrap();
        assert!(result.is_consistent());
        assert_eq!(result.equity_curve.len(), table.len());
    }

    #[test]
    fn empty_table_yields_empty_result() {
        let table = OhlcvTable::from_bars(vec![]);
        let params = StrategyParams::default();
        let result = run(&table, &params, 0, BalanceMixer::default()).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
    }

    #[test]
    fn date_filter_blocks_entries_before_trade_start() {
        let table = synthetic_table(200);
        let params = StrategyParams {
            use_date_filter: true,
            ma_length: 5,
            trail_ma_long_length: 5,
            trail_ma_short_length: 5,
            close_count_long: 1,
            close_count_short: 1,
            ..StrategyParams::default()
        };
        let result = run(&table, &params, 190, BalanceMixer::default()).unwrap();
        for t in &result.trades {
            let idx = table.bars().iter().position(|b| b.timestamp == t.entry_time).unwrap();
            assert!(idx >= 190);
        }
    }
}
