use chrono::{DateTime, Duration, Utc};
use qre_core::{OhlcvTable, ParamPayload, ParamSchema, QreResult, StrategyResult};
use qre_optimizer::{Optimizer, TrialRecord};
use qre_postprocess::{Candidate, DeflatedSharpeConfig, ModuleStatus, ModuleStatusMap, StressStatus, StressTestConfig};
use qre_strategy::{BalanceMixer, StrategyParams};
use sha2::{Digest, Sha256};

use crate::types::{AdaptiveTelemetry, BestParamsSource, SelectionChain, WfaConfig, WfaWindow};

/// Compress/sample an OOS equity curve down to one point per closed trade,
/// matching the "trade-exit-sampled" compact form alongside the dense
/// every-bar curve.
pub(crate) fn compact_from_trade_exits(dense: &[f64], trade_count: usize) -> Vec<f64> {
    if trade_count == 0 || dense.is_empty() {
        return Vec::new();
    }
    let step = (dense.len() / trade_count.max(1)).max(1);
    dense.iter().skip(step - 1).step_by(step).copied().collect()
}

/// An 8-hex-char stable label for a parameter set: `s01-<hash>`. The prefix
/// names the strategy; the hash is derived from a canonical rendering of
/// the payload so identical params always label identically.
pub(crate) fn param_id(strategy_id: &str, params: &ParamPayload) -> String {
    let mut canonical = String::new();
    for (k, v) in params.iter() {
        canonical.push_str(k);
        canonical.push('=');
        canonical.push_str(&format!("{v:?}"));
        canonical.push(';');
    }
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let short = hex::encode(&digest[..4]);
    format!("{strategy_id}-{short}")
}

fn best_by_composite(trials: &[TrialRecord]) -> Vec<&TrialRecord> {
    let mut sorted: Vec<&TrialRecord> = trials.iter().filter(|t| t.constraints_satisfied && !t.pruned).collect();
    sorted.sort_by(|a, b| b.composite_score.partial_cmp(&a.composite_score).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// The final parameter set chosen for a window, and which module chose it.
pub struct SelectedWinner {
    pub params: ParamPayload,
    pub selection_chain: SelectionChain,
    pub best_params_source: BestParamsSource,
    pub module_status: ModuleStatusMap,
}

/// Run the optimizer over the IS (minus any FT tail) subrange, then narrow
/// the winner through whichever of DSR/FT/ST are enabled. Returns the final
/// selection plus the IS index bounds the caller needs for re-evaluation.
pub fn select_winner(
    full_table: &OhlcvTable,
    schema: &ParamSchema,
    window_number: usize,
    is_start: DateTime<Utc>,
    is_end: DateTime<Utc>,
    config: &WfaConfig,
    seed: u64,
) -> QreResult<(SelectedWinner, usize, usize)> {
    let is_start_idx = full_table.index_at_or_after(is_start);
    let is_end_idx = full_table.index_at_or_before(is_end).map(|i| i + 1).unwrap_or(is_start_idx);

    let ft_config = &config.post_process.forward_test;
    let opt_sub_end = if ft_config.enabled { (is_end - Duration::days(ft_config.ft_period_days)).max(is_start) } else { is_end };
    let opt_sub_end_idx = full_table.index_at_or_before(opt_sub_end).map(|i| i + 1).unwrap_or(is_start_idx);

    let opt_table = full_table.slice(0, opt_sub_end_idx);
    let optimizer = Optimizer::new(config.optimization.clone(), seed.wrapping_add(window_number as u64));
    let opt_run = optimizer.run(&opt_table, schema, is_start_idx)?;

    let sorted = best_by_composite(&opt_run.trials);
    let mut selection_chain = SelectionChain { optuna_winner: sorted.first().map(|t| t.trial_number), ..Default::default() };
    let mut best_params_source = BestParamsSource::Optuna;
    let mut winner_params: ParamPayload = sorted.first().map(|t| t.params.clone()).unwrap_or_else(|| schema.default_payload());
    let mut winner_trial_number = selection_chain.optuna_winner.unwrap_or(0);

    let all_candidates: Vec<Candidate> =
        sorted.iter().map(|t| Candidate { trial_number: t.trial_number, params: t.params.clone() }).collect();

    let mut module_status = ModuleStatusMap::new();

    if config.post_process.deflated_sharpe.enabled && !all_candidates.is_empty() {
        let dsr_cfg = DeflatedSharpeConfig { enabled: true, top_k: config.store_top_n_trials.max(1) };
        let dsr_pool: Vec<Candidate> = all_candidates.iter().take(dsr_cfg.top_k).cloned().collect();
        match qre_postprocess::dsr::run_deflated_sharpe_ratio(&opt_table, schema, is_start_idx, &dsr_pool, opt_run.trials.len(), &dsr_cfg)
        {
            Ok(dsr_outcomes) => {
                module_status.insert("dsr".into(), ModuleStatus::ok());
                if let Some(top) = dsr_outcomes.first() {
                    if let Some(c) = all_candidates.iter().find(|c| c.trial_number == top.trial_number) {
                        winner_params = c.params.clone();
                        winner_trial_number = top.trial_number;
                        selection_chain.dsr_winner = Some(top.trial_number);
                        best_params_source = BestParamsSource::DeflatedSharpe;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(window = window_number, module = "dsr", %err, "deflated Sharpe module failed, keeping Optuna winner");
                module_status.insert("dsr".into(), ModuleStatus::failed(err.to_string()));
            }
        }
    }

    if ft_config.enabled && opt_sub_end < is_end {
        let candidate = Candidate { trial_number: winner_trial_number, params: winner_params.clone() };
        let ft_result = StrategyParams::from_payload(&candidate.params, schema)
            .and_then(|base_params| qre_strategy::run(&opt_table, &base_params, is_start_idx, BalanceMixer::default()))
            .and_then(|base_result| {
                let mut is_profit_pct = std::collections::HashMap::new();
                is_profit_pct.insert(candidate.trial_number, base_result.basic.net_profit_pct);
                let is_table = full_table.slice(0, is_end_idx);
                qre_postprocess::forward_test::run_forward_test(
                    &is_table,
                    schema,
                    std::slice::from_ref(&candidate),
                    &is_profit_pct,
                    is_start,
                    is_end,
                    ft_config,
                )
            });
        match ft_result {
            Ok(ft_outcomes) => {
                module_status.insert("forward_test".into(), ModuleStatus::ok());
                if let Some(top) = ft_outcomes.first() {
                    winner_trial_number = top.trial_number;
                    selection_chain.forward_test_winner = Some(top.trial_number);
                    best_params_source = BestParamsSource::ForwardTest;
                }
            }
            Err(err) => {
                tracing::warn!(window = window_number, module = "forward_test", %err, "forward test module failed, keeping prior winner");
                module_status.insert("forward_test".into(), ModuleStatus::failed(err.to_string()));
            }
        }
    }

    let st_config = &config.post_process.stress_test;
    if st_config.enabled {
        let candidate = Candidate { trial_number: winner_trial_number, params: winner_params.clone() };
        match qre_postprocess::stress_test::run_stress_test(&opt_table, schema, is_start_idx, std::slice::from_ref(&candidate), st_config) {
            Ok(st_outcomes) => {
                module_status.insert("stress_test".into(), ModuleStatus::ok());
                if let Some(top) = st_outcomes.first() {
                    if top.status == StressStatus::Ok {
                        winner_params = candidate.params.clone();
                        selection_chain.stress_test_winner = Some(top.trial_number);
                        best_params_source = BestParamsSource::StressTest;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(window = window_number, module = "stress_test", %err, "stress test module failed, keeping prior winner");
                module_status.insert("stress_test".into(), ModuleStatus::failed(err.to_string()));
            }
        }
    }

    Ok((SelectedWinner { params: winner_params, selection_chain, best_params_source, module_status }, is_start_idx, is_end_idx))
}

/// Re-run the selected params on full IS and on `[0, oos_end)`, returning the
/// raw strategy results the caller needs both for the final `WfaWindow` and,
/// in adaptive mode, for scanning trigger conditions over a provisional OOS
/// run before the real cutoff is known.
pub fn evaluate(
    full_table: &OhlcvTable,
    schema: &ParamSchema,
    is_end_idx: usize,
    is_start_idx: usize,
    oos_start: DateTime<Utc>,
    oos_end: DateTime<Utc>,
    winner: &SelectedWinner,
) -> QreResult<(StrategyResult, StrategyResult, usize)> {
    let final_params = StrategyParams::from_payload(&winner.params, schema)?;

    let is_table = full_table.slice(0, is_end_idx);
    let is_result = qre_strategy::run(&is_table, &final_params, is_start_idx, BalanceMixer::default())?;

    let oos_end_idx = full_table.index_at_or_before(oos_end).map(|i| i + 1).unwrap_or(is_end_idx);
    let oos_start_idx = full_table.index_at_or_after(oos_start);
    let oos_table = full_table.slice(0, oos_end_idx);
    let oos_result = qre_strategy::run(&oos_table, &final_params, oos_start_idx, BalanceMixer::default())?;

    Ok((is_result, oos_result, oos_start_idx))
}

/// Assemble the final `WfaWindow` from already-evaluated IS/OOS results.
#[allow(clippy::too_many_arguments)]
pub fn build_window(
    strategy_id: &str,
    window_number: usize,
    is_start: DateTime<Utc>,
    is_end: DateTime<Utc>,
    oos_start: DateTime<Utc>,
    oos_end_nominal: DateTime<Utc>,
    oos_end_actual: DateTime<Utc>,
    winner: SelectedWinner,
    is_result: StrategyResult,
    oos_result: StrategyResult,
    oos_start_idx: usize,
    adaptive: AdaptiveTelemetry,
) -> WfaWindow {
    let oos_equity_dense: Vec<f64> = oos_result.equity_curve[oos_start_idx.min(oos_result.equity_curve.len())..].to_vec();
    let oos_equity_compact = compact_from_trade_exits(&oos_equity_dense, oos_result.trades.len());

    WfaWindow {
        window_number,
        is_start,
        is_end,
        oos_start,
        oos_end_nominal,
        oos_end_actual,
        param_id: param_id(strategy_id, &winner.params),
        best_params: winner.params,
        selection_chain: winner.selection_chain,
        best_params_source: winner.best_params_source,
        is_metrics: is_result.basic,
        oos_metrics: oos_result.basic,
        oos_equity_dense,
        oos_equity_compact,
        adaptive,
        module_status: winner.module_status,
    }
}

/// Run the full per-window pipeline for a fixed-mode window, where
/// `oos_end_actual` is known up front (it equals the nominal end).
#[allow(clippy::too_many_arguments)]
pub fn run_window(
    full_table: &OhlcvTable,
    schema: &ParamSchema,
    strategy_id: &str,
    window_number: usize,
    is_start: DateTime<Utc>,
    is_end: DateTime<Utc>,
    oos_start: DateTime<Utc>,
    oos_end_nominal: DateTime<Utc>,
    oos_end_actual: DateTime<Utc>,
    config: &WfaConfig,
    seed: u64,
) -> QreResult<WfaWindow> {
    let (winner, is_start_idx, is_end_idx) = select_winner(full_table, schema, window_number, is_start, is_end, config, seed)?;
    let (is_result, oos_result, oos_start_idx) =
        evaluate(full_table, schema, is_end_idx, is_start_idx, oos_start, oos_end_actual, &winner)?;
    let actual_oos_days = (oos_end_actual - oos_start).num_days().max(0);
    Ok(build_window(
        strategy_id,
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
        AdaptiveTelemetry { actual_oos_days, ..Default::default() },
    ))
}
