use qre_core::{OhlcvTable, ParamPayload, ParamSchema, ParamType, ParamValue, QreResult};
use qre_strategy::{BalanceMixer, StrategyParams};

use crate::types::{Candidate, StressStatus, StressTestConfig, StressTestOutcome};

/// Perturb each optimizable numeric parameter by one step in each direction,
/// bounded by the schema's declared range. A parameter whose value is
/// already pinned to a degenerate `[min, max]` range contributes nothing.
fn perturbed_payloads(schema: &ParamSchema, base: &ParamPayload) -> Vec<ParamPayload> {
    let mut out = Vec::new();
    for spec in schema.optimizable() {
        if !matches!(spec.param_type, ParamType::Int | ParamType::Float) {
            continue;
        }
        let (Some(min), Some(max)) = (spec.optimize.min, spec.optimize.max) else {
            continue;
        };
        if max <= min {
            continue;
        }
        let Some(base_value) = base.get(&spec.name).and_then(ParamValue::as_f64) else {
            continue;
        };
        let step = spec.optimize.step.unwrap_or((max - min) * 0.05).max((max - min) * 0.001);

        for delta in [-step, step] {
            let mut value = (base_value + delta).clamp(min, max);
            if spec.param_type == ParamType::Int {
                value = value.round();
            }
            if (value - base_value).abs() < 1e-9 {
                continue;
            }
            let mut payload = base.clone();
            payload.insert(spec.name.clone(), ParamValue::Number(value));
            out.push(payload);
        }
    }
    out
}

fn percentile(sorted_ascending: &[f64], p: f64) -> f64 {
    if sorted_ascending.is_empty() {
        return 0.0;
    }
    let idx = (((sorted_ascending.len() - 1) as f64) * p).round() as usize;
    sorted_ascending[idx.min(sorted_ascending.len() - 1)]
}

fn degenerate(trial_number: usize, status: StressStatus, n_perturbations: usize) -> StressTestOutcome {
    let worst_case = status == StressStatus::SkippedBadBase;
    StressTestOutcome {
        trial_number,
        status,
        retention_p5: 0.0,
        retention_p50: 0.0,
        retention_worst: 0.0,
        profit_failure_rate: if worst_case { 1.0 } else { 0.0 },
        romad_failure_rate: if worst_case { 1.0 } else { 0.0 },
        combined_failure_rate: if worst_case { 1.0 } else { 0.0 },
        n_perturbations,
    }
}

/// Re-run each candidate under every bounded single-parameter perturbation
/// and aggregate how much of its base performance survives.
pub fn run_stress_test(
    table: &OhlcvTable,
    schema: &ParamSchema,
    trade_start_idx: usize,
    candidates: &[Candidate],
    config: &StressTestConfig,
) -> QreResult<Vec<StressTestOutcome>> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(config.top_k.min(candidates.len()));
    for candidate in candidates.iter().take(config.top_k) {
        let base_params = StrategyParams::from_payload(&candidate.params, schema)?;
        let base_result = qre_strategy::run(table, &base_params, trade_start_idx, BalanceMixer::default())?;
        let base_profit = base_result.basic.net_profit_pct;
        let base_romad = base_result.advanced.romad;

        if base_profit <= 0.0 {
            outcomes.push(degenerate(candidate.trial_number, StressStatus::SkippedBadBase, 0));
            continue;
        }

        let payloads = perturbed_payloads(schema, &candidate.params);
        if payloads.is_empty() {
            outcomes.push(degenerate(candidate.trial_number, StressStatus::SkippedNoParams, 0));
            continue;
        }

        let mut profit_retentions = Vec::with_capacity(payloads.len());
        let mut romad_retentions = Vec::new();
        for payload in &payloads {
            let params = StrategyParams::from_payload(payload, schema)?;
            let result = qre_strategy::run(table, &params, trade_start_idx, BalanceMixer::default())?;
            profit_retentions.push(result.basic.net_profit_pct / base_profit);
            if let (Some(base_r), Some(r)) = (base_romad, result.advanced.romad) {
                if base_r.abs() > 1e-9 {
                    romad_retentions.push(r / base_r);
                }
            }
        }

        if profit_retentions.len() < 4 {
            outcomes.push(degenerate(candidate.trial_number, StressStatus::InsufficientData, profit_retentions.len()));
            continue;
        }

        let mut sorted = profit_retentions.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let profit_failure_rate =
            profit_retentions.iter().filter(|r| **r < config.failure_threshold).count() as f64 / profit_retentions.len() as f64;
        let romad_failure_rate = if romad_retentions.is_empty() {
            0.0
        } else {
            romad_retentions.iter().filter(|r| **r < config.failure_threshold).count() as f64 / romad_retentions.len() as f64
        };

        outcomes.push(StressTestOutcome {
            trial_number: candidate.trial_number,
            status: StressStatus::Ok,
            retention_p5: percentile(&sorted, 0.05),
            retention_p50: percentile(&sorted, 0.50),
            retention_worst: sorted.first().copied().unwrap_or(0.0),
            profit_failure_rate,
            romad_failure_rate,
            combined_failure_rate: (profit_failure_rate + romad_failure_rate) / 2.0,
            n_perturbations: profit_retentions.len(),
        });
    }

    outcomes.sort_by(|a, b| {
        let a_ok = a.status == StressStatus::Ok;
        let b_ok = b.status == StressStatus::Ok;
        b_ok.cmp(&a_ok).then(a.combined_failure_rate.partial_cmp(&b.combined_failure_rate).unwrap_or(std::cmp::Ordering::Equal))
    });

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_picks_nearest_rank() {
        let sorted = vec![0.1, 0.4, 0.6, 0.8, 1.0];
        assert_eq!(percentile(&sorted, 0.0), 0.1);
        assert_eq!(percentile(&sorted, 1.0), 1.0);
    }

    #[test]
    fn perturbed_payloads_skips_degenerate_ranges() {
        let schema = ParamSchema {
            specs: vec![qre_core::ParamSpec {
                name: "x".into(),
                param_type: ParamType::Float,
                default: ParamValue::Number(5.0),
                options: None,
                optimize: qre_core::OptimizeSpec { enabled: true, min: Some(5.0), max: Some(5.0), step: None, options: None },
            }],
        };
        let mut base = ParamPayload::new();
        base.insert("x".into(), ParamValue::Number(5.0));
        assert!(perturbed_payloads(&schema, &base).is_empty());
    }
}
