use qre_core::{OhlcvTable, ParamSchema, QreResult};
use qre_strategy::{BalanceMixer, StrategyParams};

use crate::types::{
    Candidate, DeflatedSharpeOutcome, ForwardTestOutcome, OosTestConfig, OosTestOutcome, SelectionSource, StressStatus, StressTestOutcome,
};

/// Pick which prior stage's ranking seeds the OOS pool, following "last
/// finished module wins": Stress Test (`Ok` status only), then Forward
/// Test, then Deflated Sharpe, then the raw trial pool.
pub fn select_source_pool<'a>(
    all_candidates: &'a [Candidate],
    stress: &[StressTestOutcome],
    forward: &[ForwardTestOutcome],
    dsr: &[DeflatedSharpeOutcome],
) -> (SelectionSource, Vec<&'a Candidate>) {
    let find = |n: usize| all_candidates.iter().find(|c| c.trial_number == n);

    let ok_stress: Vec<&Candidate> = stress
        .iter()
        .filter(|s| s.status == StressStatus::Ok)
        .filter_map(|s| find(s.trial_number))
        .collect();
    if !ok_stress.is_empty() {
        return (SelectionSource::StressTest, ok_stress);
    }

    let from_forward: Vec<&Candidate> = forward.iter().filter_map(|f| find(f.trial_number)).collect();
    if !from_forward.is_empty() {
        return (SelectionSource::ForwardTest, from_forward);
    }

    let from_dsr: Vec<&Candidate> = dsr.iter().filter_map(|d| find(d.trial_number)).collect();
    if !from_dsr.is_empty() {
        return (SelectionSource::DeflatedSharpe, from_dsr);
    }

    (SelectionSource::Optuna, all_candidates.iter().collect())
}

/// Re-run the selected candidates on the held-out OOS window.
pub fn run_oos_test(
    oos_table: &OhlcvTable,
    schema: &ParamSchema,
    oos_trade_start_idx: usize,
    candidates: &[&Candidate],
    config: &OosTestConfig,
) -> QreResult<Vec<OosTestOutcome>> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(config.top_k.min(candidates.len()));
    for candidate in candidates.iter().take(config.top_k) {
        let params = StrategyParams::from_payload(&candidate.params, schema)?;
        let result = qre_strategy::run(oos_table, &params, oos_trade_start_idx, BalanceMixer::default())?;

        let oos_profit_pct = result.basic.net_profit_pct;
        outcomes.push(OosTestOutcome {
            trial_number: candidate.trial_number,
            oos_profit_pct,
            oos_max_drawdown_pct: result.basic.max_drawdown_pct,
            oos_total_trades: result.basic.total_trades,
            passed: oos_profit_pct >= config.min_profit_threshold,
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::ParamPayload;

    fn candidate(n: usize) -> Candidate {
        Candidate { trial_number: n, params: ParamPayload::new() }
    }

    #[test]
    fn stress_ok_candidates_take_precedence() {
        let all = vec![candidate(1), candidate(2), candidate(3)];
        let stress = vec![StressTestOutcome {
            trial_number: 2,
            status: StressStatus::Ok,
            retention_p5: 0.0,
            retention_p50: 0.0,
            retention_worst: 0.0,
            profit_failure_rate: 0.0,
            romad_failure_rate: 0.0,
            combined_failure_rate: 0.0,
            n_perturbations: 4,
        }];
        let (source, pool) = select_source_pool(&all, &stress, &[], &[]);
        assert_eq!(source, SelectionSource::StressTest);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].trial_number, 2);
    }

    #[test]
    fn falls_back_to_optuna_pool_when_nothing_ran() {
        let all = vec![candidate(1), candidate(2)];
        let (source, pool) = select_source_pool(&all, &[], &[], &[]);
        assert_eq!(source, SelectionSource::Optuna);
        assert_eq!(pool.len(), 2);
    }
}
