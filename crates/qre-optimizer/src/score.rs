use crate::types::{Direction, MetricBounds, Objective, ScoreConfig, ScoreNormalization, TrialRecord};

/// Rank-based normalization: each trial's value is replaced by its
/// percentile among feasible trials, `[0, 1]`. Robust to outliers, but the
/// result depends on whatever cohort it was computed against.
fn percentile_normalize(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n <= 1 {
        return vec![0.5; n];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));
    let mut ranks = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = rank as f64 / (n - 1) as f64;
    }
    ranks
}

/// Linear rescale to `[0, 1]` against a fixed `(min, max)`, clamping values
/// outside the range. Unlike percentile normalization this never looks at
/// the rest of the batch, so a trial's score is the same whether it is
/// scored alone or inside a cohort of a hundred.
fn minmax_normalize(values: &[f64], min: f64, max: f64) -> Vec<f64> {
    let span = max - min;
    if span <= f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|&v| ((v - min) / span).clamp(0.0, 1.0)).collect()
}

/// Assign a single composite score (`[0, 100]`) to every feasible trial:
/// normalize each enabled objective independently, flip metrics flagged
/// `invert` (lower is better), then take the weighted mean over the
/// enabled objectives. Infeasible trials (failed a constraint) get `None`,
/// as do trials where every objective has been disabled in `score_config`.
pub fn composite_scores(trials: &[TrialRecord], objectives: &[Objective], config: &ScoreConfig) -> Vec<Option<f64>> {
    let n = trials.len();
    if n == 0 || objectives.is_empty() {
        return vec![None; n];
    }

    let bounds: Vec<Option<&MetricBounds>> = objectives.iter().map(|o| config.bounds_for(&o.metric)).collect();
    let enabled: Vec<bool> = bounds.iter().map(|b| b.map(|b| b.enabled).unwrap_or(true)).collect();

    let raw_weights = if config.weights.len() == objectives.len() {
        config.weights.clone()
    } else {
        vec![1.0 / objectives.len() as f64; objectives.len()]
    };
    let enabled_weight_sum: f64 = raw_weights.iter().zip(&enabled).filter(|(_, &e)| e).map(|(w, _)| *w).sum();
    let weights: Vec<f64> = if enabled_weight_sum > f64::EPSILON {
        raw_weights.iter().zip(&enabled).map(|(&w, &e)| if e { w / enabled_weight_sum } else { 0.0 }).collect()
    } else {
        vec![0.0; objectives.len()]
    };

    let mut normalized_per_objective: Vec<Vec<f64>> = Vec::with_capacity(objectives.len());
    for (obj_idx, objective) in objectives.iter().enumerate() {
        let raw: Vec<f64> = trials.iter().map(|t| t.objective_values.get(obj_idx).copied().unwrap_or(0.0)).collect();
        let metric_bounds = bounds[obj_idx];
        let invert = metric_bounds.map(|b| b.invert).unwrap_or(false);

        // A metric with fixed bounds carries its own "lower is better" via
        // `invert`; only fall back to the objective's direction for metrics
        // with no configured bounds.
        let oriented: Vec<f64> = if metric_bounds.is_some() || objective.direction == Direction::Maximize {
            raw
        } else {
            raw.iter().map(|v| -v).collect()
        };

        let normalized = match config.normalization {
            ScoreNormalization::Percentile => percentile_normalize(&oriented),
            ScoreNormalization::MinMax => {
                let (min, max) = metric_bounds.map(|b| (b.min, b.max)).unwrap_or((0.0, 1.0));
                minmax_normalize(&oriented, min, max)
            }
        };

        let scaled: Vec<f64> = normalized.iter().map(|&v| if invert { 100.0 - v * 100.0 } else { v * 100.0 }).collect();
        normalized_per_objective.push(scaled);
    }

    (0..n)
        .map(|i| {
            if !trials[i].constraints_satisfied || enabled.iter().all(|&e| !e) {
                return None;
            }
            let score = (0..objectives.len()).map(|obj_idx| normalized_per_objective[obj_idx][i] * weights[obj_idx]).sum();
            Some(score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoreNormalization;
    use qre_core::ParamPayload;

    fn trial(values: Vec<f64>, feasible: bool) -> TrialRecord {
        TrialRecord {
            trial_number: 0,
            params: ParamPayload::new(),
            objective_values: values,
            constraints_satisfied: feasible,
            constraint_values: vec![],
            composite_score: None,
            is_pareto_optimal: false,
            dominance_rank: 0,
            pruned: false,
        }
    }

    #[test]
    fn infeasible_trials_get_no_score() {
        let objectives = vec![Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize }];
        let trials = vec![trial(vec![1.0], true), trial(vec![2.0], false)];
        let scores = composite_scores(&trials, &objectives, &ScoreConfig::default());
        assert!(scores[0].is_some());
        assert!(scores[1].is_none());
    }

    #[test]
    fn higher_raw_value_scores_higher_when_maximizing() {
        let objectives = vec![Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize }];
        let trials = vec![trial(vec![1.0], true), trial(vec![5.0], true), trial(vec![3.0], true)];
        let scores: Vec<f64> = composite_scores(&trials, &objectives, &ScoreConfig::default()).into_iter().map(|s| s.unwrap()).collect();
        assert!(scores[1] > scores[2]);
        assert!(scores[2] > scores[0]);
    }

    #[test]
    fn minmax_score_is_independent_of_cohort() {
        let objectives = vec![Objective { metric: "romad".into(), direction: Direction::Maximize }];
        let config = ScoreConfig { normalization: ScoreNormalization::MinMax, ..ScoreConfig::default() };

        let solo = vec![trial(vec![2.5], true)];
        let solo_score = composite_scores(&solo, &objectives, &config)[0].unwrap();

        let mut cohort: Vec<TrialRecord> = (0..100).map(|i| trial(vec![i as f64 / 20.0], true)).collect();
        cohort.push(trial(vec![2.5], true));
        let cohort_score = composite_scores(&cohort, &objectives, &config)[100].unwrap();

        assert!((solo_score - cohort_score).abs() <= 0.01, "solo={solo_score} cohort={cohort_score}");
    }

    #[test]
    fn minmax_inverts_metrics_where_lower_is_better() {
        let objectives = vec![Objective { metric: "ulcer_index".into(), direction: Direction::Maximize }];
        let config = ScoreConfig { normalization: ScoreNormalization::MinMax, ..ScoreConfig::default() };
        let trials = vec![trial(vec![0.0], true), trial(vec![50.0], true)];
        let scores: Vec<f64> = composite_scores(&trials, &objectives, &config).into_iter().map(|s| s.unwrap()).collect();
        assert!(scores[0] > scores[1], "low ulcer should score higher than high ulcer: {scores:?}");
    }

    #[test]
    fn disabling_a_metric_renormalizes_remaining_weights() {
        let objectives = vec![
            Objective { metric: "romad".into(), direction: Direction::Maximize },
            Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize },
        ];
        let mut config = ScoreConfig { normalization: ScoreNormalization::MinMax, ..ScoreConfig::default() };
        for b in config.bounds.iter_mut() {
            if b.metric == "romad" {
                b.enabled = false;
            }
        }
        let trials = vec![trial(vec![2.5, 5.0], true)];
        let score = composite_scores(&trials, &objectives, &config)[0].unwrap();
        // sharpe_ratio alone, clamped to [-3, 5], at 5.0 -> 100.0
        assert!((score - 100.0).abs() < 1e-6, "score={score}");
    }
}
