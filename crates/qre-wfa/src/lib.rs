pub mod pipeline;
pub mod splitter;
pub mod stitch;
pub mod types;

use chrono::{DateTime, Duration, Utc};
use qre_core::{OhlcvTable, ParamSchema, QreError, QreResult};

pub use types::*;

/// Minimum number of completed windows a walk-forward run must produce to be
/// considered meaningful; fewer than this and the stitched curve is mostly
/// noise.
const MIN_WINDOWS: usize = 2;

/// Floor on bars required on each side of a window before it's worth
/// running at all.
const MIN_BARS_PER_SIDE: usize = 100;

/// Drives a full walk-forward study over `table`: splits `[trading_start,
/// trading_end]` into fixed or adaptive IS/OOS windows, runs the per-window
/// optimize + post-process pipeline on each, and stitches the OOS segments
/// into one equity curve with an aggregate WFE.
pub struct WalkForwardEngine<'a> {
    table: &'a OhlcvTable,
    schema: &'a ParamSchema,
    strategy_id: &'a str,
    config: WfaConfig,
    seed: u64,
}

impl<'a> WalkForwardEngine<'a> {
    pub fn new(table: &'a OhlcvTable, schema: &'a ParamSchema, strategy_id: &'a str, config: WfaConfig, seed: u64) -> Self {
        Self { table, schema, strategy_id, config, seed }
    }

    pub fn run(&self, trading_start: DateTime<Utc>, trading_end: DateTime<Utc>) -> QreResult<WfaResult> {
        tracing::info!(strategy_id = self.strategy_id, adaptive = self.config.adaptive_mode, "starting walk-forward study");

        let windows = if self.config.adaptive_mode {
            self.run_adaptive(trading_start, trading_end)?
        } else {
            self.run_fixed(trading_start, trading_end)?
        };

        if windows.len() < MIN_WINDOWS {
            tracing::error!(windows = windows.len(), required = MIN_WINDOWS, "walk-forward study produced too few windows");
            return Err(QreError::InputValidation(format!(
                "walk-forward requires at least {MIN_WINDOWS} completed windows, got {}",
                windows.len()
            )));
        }

        let stitched = stitch::stitch(&windows, self.config.adaptive_mode);
        tracing::info!(windows = windows.len(), stitched_net_profit_pct = stitched.stitched_net_profit_pct, "walk-forward study complete");
        Ok(WfaResult { windows, stitched })
    }

    fn check_window_size(&self, is_start: DateTime<Utc>, is_end: DateTime<Utc>, oos_start: DateTime<Utc>, oos_end: DateTime<Utc>) {
        let is_bars = self.table.index_at_or_before(is_end).unwrap_or(0).saturating_sub(self.table.index_at_or_after(is_start));
        let oos_bars = self.table.index_at_or_before(oos_end).unwrap_or(0).saturating_sub(self.table.index_at_or_after(oos_start));
        if is_bars < MIN_BARS_PER_SIDE || oos_bars < MIN_BARS_PER_SIDE {
            tracing::warn!(is_bars, oos_bars, floor = MIN_BARS_PER_SIDE, "window has fewer bars than the recommended floor");
        }
    }

    fn run_fixed(&self, trading_start: DateTime<Utc>, trading_end: DateTime<Utc>) -> QreResult<Vec<WfaWindow>> {
        let fixed = splitter::fixed_windows(trading_start, trading_end, self.config.is_period_days, self.config.oos_period_days);
        let mut windows = Vec::with_capacity(fixed.len());
        for fw in &fixed {
            self.check_window_size(fw.is_start, fw.is_end, fw.oos_start, fw.oos_end);
            tracing::info!(window = fw.window_number, is_start = %fw.is_start, oos_end = %fw.oos_end, "running window");
            let window = pipeline::run_window(
                self.table,
                self.schema,
                self.strategy_id,
                fw.window_number,
                fw.is_start,
                fw.is_end,
                fw.oos_start,
                fw.oos_end,
                fw.oos_end,
                &self.config,
                self.seed,
            )?;
            windows.push(window);
        }
        Ok(windows)
    }

    fn run_adaptive(&self, trading_start: DateTime<Utc>, trading_end: DateTime<Utc>) -> QreResult<Vec<WfaWindow>> {
        let mut windows = Vec::new();
        let mut is_start = trading_start;
        let mut window_number = 1;

        loop {
            let is_end = is_start + Duration::days(self.config.is_period_days);
            let oos_start = is_end;
            let oos_end_nominal = (oos_start + Duration::days(self.config.max_oos_period_days)).min(trading_end);
            if oos_start >= trading_end {
                break;
            }

            self.check_window_size(is_start, is_end, oos_start, oos_end_nominal);
            tracing::info!(window = window_number, is_start = %is_start, oos_end_nominal = %oos_end_nominal, "running adaptive window");

            let (winner, is_start_idx, is_end_idx) =
                pipeline::select_winner(self.table, self.schema, window_number, is_start, is_end, &self.config, self.seed)?;

            // Provisional run out to the max OOS length, purely to obtain a
            // trade sequence the trigger scan can walk.
            let (is_result, provisional_oos, _) =
                pipeline::evaluate(self.table, self.schema, is_end_idx, is_start_idx, oos_start, oos_end_nominal, &winner)?;

            let trigger = splitter::scan_adaptive_trigger(
                &is_result.trades,
                is_result.basic.max_drawdown_pct,
                oos_start,
                oos_end_nominal,
                &provisional_oos.trades,
                &self.config,
            );

            let oos_end_actual = trigger.actual_oos_end;

            let (is_result, oos_result, oos_start_idx) = if oos_end_actual == oos_end_nominal {
                (is_result, provisional_oos, self.table.index_at_or_after(oos_start))
            } else {
                pipeline::evaluate(self.table, self.schema, is_end_idx, is_start_idx, oos_start, oos_end_actual, &winner)?
            };

            let adaptive = AdaptiveTelemetry {
                trigger_type: trigger.trigger_type,
                cusum_final: trigger.cusum_final,
                dd_peak_pct: trigger.dd_peak_pct,
                actual_oos_days: (oos_end_actual - oos_start).num_days().max(0),
            };

            windows.push(pipeline::build_window(
                self.strategy_id,
                window_number,
                is_start,
                is_end,
                oos_start,
                oos_end_nominal,
                oos_end_actual,
                winner,
                is_result,
                oos_result,
                oos_start_idx,
                adaptive,
            ));

            if trigger.trigger_type.is_some() {
                tracing::info!(window = window_number, trigger = ?trigger.trigger_type, oos_end_actual = %oos_end_actual, "adaptive window truncated early");
            }

            if oos_end_actual >= trading_end {
                break;
            }
            let advance_days = (oos_end_actual - oos_start).num_days().max(1);
            is_start += Duration::days(advance_days);
            window_number += 1;
        }

        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::Bar;
    use qre_optimizer::{Direction, Objective, OptimizationConfig, SamplerType};
    use qre_postprocess::{DeflatedSharpeConfig, ForwardTestConfig, OosTestConfig, PostProcessChainConfig, StressTestConfig};

    fn synthetic_table(n: usize, start_ts: i64) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(n);
        let mut price = 100.0_f64;
        for i in 0..n {
            price += ((i as f64) * 0.1).sin() * 0.5 + 0.01;
            bars.push(Bar {
                timestamp: DateTime::<Utc>::from_timestamp(start_ts + i as i64 * 3600, 0).unwrap(),
                open: price,
                high: price + 1.0,
                low: price - 1.0,
                close: price,
                volume: 100.0,
            });
        }
        bars
    }

    fn light_config() -> WfaConfig {
        WfaConfig {
            is_period_days: 20,
            oos_period_days: 10,
            adaptive_mode: false,
            optimization: OptimizationConfig {
                sampler: SamplerType::Random,
                objectives: vec![Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize }],
                n_trials: 4,
                max_workers: 2,
                sanitize_enabled: false,
                ..OptimizationConfig::default()
            },
            post_process: PostProcessChainConfig {
                deflated_sharpe: DeflatedSharpeConfig { enabled: false, top_k: 5 },
                forward_test: ForwardTestConfig { enabled: false, top_k: 5, ft_period_days: 3, rank_metric: "sharpe_ratio".into() },
                stress_test: StressTestConfig { enabled: false, top_k: 5, failure_threshold: 0.5 },
                oos_test: OosTestConfig { enabled: true, top_k: 3, min_profit_threshold: -1000.0 },
            },
            ..WfaConfig::default()
        }
    }

    #[test]
    fn fixed_mode_produces_at_least_two_windows() {
        let bars = synthetic_table(24 * 120, 0);
        let table = OhlcvTable::from_bars(bars);
        let schema = qre_strategy::schema();
        let start = table.get(0).unwrap().timestamp;
        let end = table.get(table.len() - 1).unwrap().timestamp;

        let engine = WalkForwardEngine::new(&table, &schema, "s01", light_config(), 7);
        let result = engine.run(start, end).unwrap();
        assert!(result.windows.len() >= 2);
        assert!(result.stitched.stitched_total_trades >= 0);
    }

    #[test]
    fn too_short_a_range_errors_instead_of_panicking() {
        let bars = synthetic_table(24 * 15, 0);
        let table = OhlcvTable::from_bars(bars);
        let schema = qre_strategy::schema();
        let start = table.get(0).unwrap().timestamp;
        let end = table.get(table.len() - 1).unwrap().timestamp;

        let engine = WalkForwardEngine::new(&table, &schema, "s01", light_config(), 7);
        assert!(engine.run(start, end).is_err());
    }
}
