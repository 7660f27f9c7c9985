pub mod dsr;
pub mod oos_test;
pub mod stress_test;
pub mod types;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qre_core::{OhlcvTable, ParamSchema, QreResult};
use qre_optimizer::TrialRecord;
use qre_strategy::{BalanceMixer, StrategyParams};
use serde::{Deserialize, Serialize};

pub use types::*;

/// Configuration for the full re-ranking chain: DSR -> Forward Test ->
/// Stress Test -> OOS Test, each stage narrowing the prior stage's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessChainConfig {
    pub deflated_sharpe: DeflatedSharpeConfig,
    pub forward_test: ForwardTestConfig,
    pub stress_test: StressTestConfig,
    pub oos_test: OosTestConfig,
}

#[derive(Debug, Clone)]
pub struct PostProcessResult {
    pub outcomes: PostProcessOutcomes,
    pub selection_source: SelectionSource,
    pub module_status: ModuleStatusMap,
}

fn candidates_from_trials(trials: &[TrialRecord]) -> Vec<Candidate> {
    let mut sorted: Vec<&TrialRecord> = trials.iter().filter(|t| t.constraints_satisfied && !t.pruned).collect();
    sorted.sort_by(|a, b| b.composite_score.partial_cmp(&a.composite_score).unwrap_or(std::cmp::Ordering::Equal));
    sorted.into_iter().map(|t| Candidate { trial_number: t.trial_number, params: t.params.clone() }).collect()
}

fn find_candidate<'a>(pool: &'a [Candidate], trial_number: usize) -> Option<&'a Candidate> {
    pool.iter().find(|c| c.trial_number == trial_number)
}

/// Run the full post-process chain on a completed optimization study: DSR
/// re-ranks a top-K slice of the trial set, Forward Test re-ranks DSR's
/// output against a held-out tail of the IS range, Stress Test re-ranks
/// Forward Test's output against bounded parameter perturbations, and OOS
/// Test evaluates whichever module finished last (preferring a passing
/// Stress Test) on the held-out OOS window.
pub fn run_chain(
    is_table: &OhlcvTable,
    is_trade_start_idx: usize,
    is_start: DateTime<Utc>,
    is_end: DateTime<Utc>,
    oos_table: &OhlcvTable,
    oos_trade_start_idx: usize,
    schema: &ParamSchema,
    trials: &[TrialRecord],
    config: &PostProcessChainConfig,
) -> QreResult<PostProcessResult> {
    let all_candidates = candidates_from_trials(trials);
    let mut module_status = ModuleStatusMap::new();

    let dsr_pool: Vec<Candidate> = all_candidates.iter().take(config.deflated_sharpe.top_k).cloned().collect();
    let dsr_outcomes =
        match dsr::run_deflated_sharpe_ratio(is_table, schema, is_trade_start_idx, &dsr_pool, trials.len(), &config.deflated_sharpe) {
            Ok(outcomes) => {
                module_status.insert("dsr".into(), ModuleStatus::ok());
                outcomes
            }
            Err(err) => {
                tracing::warn!(module = "dsr", %err, "deflated Sharpe ratio module failed, falling back to raw trial ranking");
                module_status.insert("dsr".into(), ModuleStatus::failed(err.to_string()));
                Vec::new()
            }
        };

    let ft_pool: Vec<Candidate> = if !dsr_outcomes.is_empty() {
        dsr_outcomes.iter().filter_map(|o| find_candidate(&all_candidates, o.trial_number).cloned()).collect()
    } else {
        all_candidates.iter().take(config.forward_test.top_k).cloned().collect()
    };

    let mut is_profit_pct: HashMap<usize, f64> = HashMap::new();
    for candidate in &ft_pool {
        match StrategyParams::from_payload(&candidate.params, schema)
            .and_then(|params| qre_strategy::run(is_table, &params, is_trade_start_idx, BalanceMixer::default()))
        {
            Ok(result) => {
                is_profit_pct.insert(candidate.trial_number, result.basic.net_profit_pct);
            }
            Err(err) => {
                tracing::warn!(module = "forward_test", trial_number = candidate.trial_number, %err, "failed to replay IS baseline for candidate, excluding from forward test");
            }
        }
    }

    let forward_outcomes =
        match forward_test::run_forward_test(is_table, schema, &ft_pool, &is_profit_pct, is_start, is_end, &config.forward_test) {
            Ok(outcomes) => {
                module_status.insert("forward_test".into(), ModuleStatus::ok());
                outcomes
            }
            Err(err) => {
                tracing::warn!(module = "forward_test", %err, "forward test module failed, falling back to prior pool");
                module_status.insert("forward_test".into(), ModuleStatus::failed(err.to_string()));
                Vec::new()
            }
        };

    let st_pool: Vec<Candidate> = if !forward_outcomes.is_empty() {
        forward_outcomes.iter().filter_map(|o| find_candidate(&all_candidates, o.trial_number).cloned()).collect()
    } else {
        ft_pool.clone()
    };

    let stress_outcomes = match stress_test::run_stress_test(is_table, schema, is_trade_start_idx, &st_pool, &config.stress_test) {
        Ok(outcomes) => {
            module_status.insert("stress_test".into(), ModuleStatus::ok());
            outcomes
        }
        Err(err) => {
            tracing::warn!(module = "stress_test", %err, "stress test module failed, falling back to prior pool");
            module_status.insert("stress_test".into(), ModuleStatus::failed(err.to_string()));
            Vec::new()
        }
    };

    let (selection_source, oos_pool) =
        oos_test::select_source_pool(&all_candidates, &stress_outcomes, &forward_outcomes, &dsr_outcomes);
    let oos_outcomes = match oos_test::run_oos_test(oos_table, schema, oos_trade_start_idx, &oos_pool, &config.oos_test) {
        Ok(outcomes) => {
            module_status.insert("oos_test".into(), ModuleStatus::ok());
            outcomes
        }
        Err(err) => {
            tracing::error!(module = "oos_test", %err, "OOS test module failed, winner carries no OOS validation");
            module_status.insert("oos_test".into(), ModuleStatus::failed(err.to_string()));
            Vec::new()
        }
    };

    Ok(PostProcessResult {
        outcomes: PostProcessOutcomes {
            forward_test: forward_outcomes,
            deflated_sharpe: dsr_outcomes,
            stress_test: stress_outcomes,
            oos_test: oos_outcomes,
        },
        selection_source,
        module_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::Bar;
    use qre_optimizer::{Objective, OptimizationConfig, Optimizer, SamplerType};

    fn synthetic_table(n: usize) -> OhlcvTable {
        let mut bars = Vec::with_capacity(n);
        let mut price = 100.0_f64;
        for i in 0..n {
            price += ((i as f64) * 0.15).sin() * 0.8 + 0.02;
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
    fn runs_the_full_chain_without_panicking() {
        let is_table = synthetic_table(700);
        let oos_table = synthetic_table(300);
        let schema = qre_strategy::schema();

        let config = OptimizationConfig {
            sampler: SamplerType::Random,
            objectives: vec![Objective { metric: "sharpe_ratio".into(), direction: qre_optimizer::Direction::Maximize }],
            n_trials: 8,
            max_workers: 2,
            sanitize_enabled: false,
            ..OptimizationConfig::default()
        };
        let run = Optimizer::new(config, 3).run(&is_table, &schema, 0).unwrap();
        assert!(!run.trials.is_empty());

        let pp_config = PostProcessChainConfig {
            deflated_sharpe: DeflatedSharpeConfig { enabled: true, top_k: 5 },
            forward_test: ForwardTestConfig { enabled: true, top_k: 5, ft_period_days: 5, rank_metric: "sharpe_ratio".into() },
            stress_test: StressTestConfig { enabled: true, top_k: 5, failure_threshold: 0.5 },
            oos_test: OosTestConfig { enabled: true, top_k: 3, min_profit_threshold: -100.0 },
        };

        let is_start = is_table.get(0).unwrap().timestamp;
        let is_end = is_table.get(is_table.len() - 1).unwrap().timestamp;

        let result = run_chain(&is_table, 0, is_start, is_end, &oos_table, 0, &schema, &run.trials, &pp_config).unwrap();
        assert!(!result.outcomes.oos_test.is_empty());
    }
}
