use qre_core::{OhlcvTable, ParamPayload, ParamSchema, QreError, QreResult, StrategyResult};
use qre_strategy::{BalanceMixer, StrategyParams};
use rayon::prelude::*;

use crate::sanitize::{is_rejected, sanitize_objectives};
use crate::types::{Constraint, OptimizationConfig, TrialRecord};

/// Read a named metric off a strategy result. Basic metrics are always
/// present; advanced metrics fall back to a sentinel that sorts worst when
/// they are undefined (e.g. Sharpe with a zero-variance equity curve),
/// matching "no opinion" rather than accidentally rewarding degenerate runs.
pub fn metric_value(result: &StrategyResult, name: &str) -> f64 {
    match name {
        "net_profit" => result.basic.net_profit,
        "net_profit_pct" => result.basic.net_profit_pct,
        "max_drawdown_pct" => result.basic.max_drawdown_pct,
        "total_trades" => result.basic.total_trades as f64,
        "winning_trades" => result.basic.winning_trades as f64,
        "losing_trades" => result.basic.losing_trades as f64,
        "win_rate" => result.basic.win_rate,
        "max_consecutive_losses" => result.basic.max_consecutive_losses as f64,
        "gross_profit" => result.basic.gross_profit,
        "gross_loss" => result.basic.gross_loss,
        "sharpe_ratio" => result.advanced.sharpe_ratio.unwrap_or(f64::NEG_INFINITY),
        "sortino_ratio" => result.advanced.sortino_ratio.unwrap_or(f64::NEG_INFINITY),
        "profit_factor" => result.advanced.profit_factor.unwrap_or(f64::NEG_INFINITY),
        "romad" => result.advanced.romad.unwrap_or(f64::NEG_INFINITY),
        "ulcer_index" => result.advanced.ulcer_index.unwrap_or(f64::INFINITY),
        "sqn" => result.advanced.sqn.unwrap_or(f64::NEG_INFINITY),
        "consistency_score" => result.advanced.consistency_score.unwrap_or(f64::NEG_INFINITY),
        "recovery_factor" => result.advanced.recovery_factor.unwrap_or(f64::NEG_INFINITY),
        _ => f64::NEG_INFINITY,
    }
}

fn check_constraints(result: &StrategyResult, constraints: &[Constraint]) -> (bool, Vec<f64>) {
    let values: Vec<f64> = constraints.iter().map(|c| metric_value(result, &c.metric)).collect();
    let satisfied = constraints.iter().zip(values.iter()).all(|(c, v)| c.is_satisfied(*v));
    (satisfied, values)
}

/// Evaluate one parameter payload: run the strategy, then derive the
/// sanitization/objective/constraint view the optimizer needs. Returns
/// `None` only for trials rejected outright by the profit floor filter
/// (never entered into history); trials that sanitization prunes are still
/// returned, just excluded from scoring downstream.
fn evaluate_one(
    table: &OhlcvTable,
    schema: &ParamSchema,
    trade_start_idx: usize,
    trial_number: usize,
    payload: ParamPayload,
    config: &OptimizationConfig,
) -> QreResult<Option<TrialRecord>> {
    let params = StrategyParams::from_payload(&payload, schema)?;
    let result = qre_strategy::run(table, &params, trade_start_idx, BalanceMixer::default())?;

    if is_rejected(&result, config) {
        tracing::info!(trial_number, "trial rejected below profit floor");
        return Ok(None);
    }

    let objective_metrics: Vec<String> = config.objectives.iter().map(|o| o.metric.clone()).collect();
    let raw_objectives: Vec<f64> = config.objectives.iter().map(|o| metric_value(&result, &o.metric)).collect();
    let (objective_values, pruned) = sanitize_objectives(&result, config, &objective_metrics, raw_objectives);

    let (constraints_satisfied, constraint_values) = check_constraints(&result, &config.constraints);

    if pruned {
        tracing::info!(trial_number, total_trades = result.basic.total_trades, "trial pruned: non-finite objective");
    } else {
        tracing::debug!(trial_number, total_trades = result.basic.total_trades, "trial completed");
    }

    Ok(Some(TrialRecord {
        trial_number,
        params: payload,
        objective_values,
        constraints_satisfied: constraints_satisfied && !pruned,
        constraint_values,
        composite_score: None,
        is_pareto_optimal: false,
        dominance_rank: 0,
        pruned,
    }))
}

/// Evaluate a batch of candidate payloads concurrently, bounded to
/// `config.clamped_workers()` threads regardless of the ambient rayon
/// global pool size.
pub fn evaluate_batch(
    table: &OhlcvTable,
    schema: &ParamSchema,
    trade_start_idx: usize,
    start_trial_number: usize,
    payloads: Vec<ParamPayload>,
    config: &OptimizationConfig,
) -> QreResult<Vec<TrialRecord>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.clamped_workers())
        .build()
        .map_err(|e| QreError::ExecutionFailure(format!("failed to build worker pool: {e}")))?;

    pool.install(|| {
        payloads
            .into_par_iter()
            .enumerate()
            .map(|(i, payload)| evaluate_one(table, schema, trade_start_idx, start_trial_number + i, payload, config))
            .collect::<QreResult<Vec<Option<TrialRecord>>>>()
    })
    .map(|records| records.into_iter().flatten().collect())
}
