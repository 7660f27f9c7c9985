use qre_core::StrategyResult;

use crate::types::OptimizationConfig;

/// Outright excludes a trial from history, independent of sanitization:
/// its net profit falls below a configured floor. Mirrors the study-level
/// `min_profit_threshold` filter.
pub fn is_rejected(result: &StrategyResult, config: &OptimizationConfig) -> bool {
    config.filter_min_profit && result.basic.net_profit_pct < config.min_profit_threshold
}

/// Reconciles a trial's raw objective readings against non-finite values.
///
/// A trial that traded too little to be statistically meaningful (total
/// trades `<= sanitize_trades_threshold`) has its non-finite objectives
/// coerced to `0.0` and survives, provided sanitization is enabled. Outside
/// that rescue window, any non-finite objective value marks the trial
/// pruned: it stays in history for audit but is excluded from scoring and
/// the Pareto front, and its value is left as-is (NaN/inf) rather than
/// coerced, so the sampler sees it as the failure it is. Profit factor at
/// `+inf` always prunes when it is one of the objectives; it never gets the
/// sanitization rescue.
pub fn sanitize_objectives(
    result: &StrategyResult,
    config: &OptimizationConfig,
    objective_metrics: &[String],
    raw: Vec<f64>,
) -> (Vec<f64>, bool) {
    let low_trade_count = result.basic.total_trades as i64 <= config.sanitize_trades_threshold as i64;
    let rescue_eligible = config.sanitize_enabled && low_trade_count;

    let mut pruned = false;
    let values = raw
        .into_iter()
        .zip(objective_metrics.iter())
        .map(|(value, metric)| {
            if metric == "profit_factor" && value == f64::INFINITY {
                pruned = true;
                return value;
            }
            if value.is_finite() {
                return value;
            }
            if rescue_eligible {
                0.0
            } else {
                pruned = true;
                value
            }
        })
        .collect();

    (values, pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::BasicMetrics;

    fn result_with(total_trades: i32, net_profit_pct: f64) -> StrategyResult {
        let mut r = StrategyResult::empty();
        r.basic = BasicMetrics { total_trades, net_profit_pct, ..Default::default() };
        r
    }

    #[test]
    fn rejects_below_profit_floor() {
        let config = OptimizationConfig {
            sanitize_enabled: false,
            filter_min_profit: true,
            min_profit_threshold: 5.0,
            ..Default::default()
        };
        assert!(is_rejected(&result_with(10, 1.0), &config));
        assert!(!is_rejected(&result_with(10, 6.0), &config));
    }

    #[test]
    fn low_trade_count_rescues_non_finite_objectives_when_enabled() {
        let config = OptimizationConfig { sanitize_enabled: true, sanitize_trades_threshold: 5, ..Default::default() };
        let result = result_with(2, 0.0);
        let metrics = vec!["sharpe_ratio".to_string()];
        let (values, pruned) = sanitize_objectives(&result, &config, &metrics, vec![f64::NAN]);
        assert!(!pruned);
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn low_trade_count_without_sanitization_prunes_instead_of_rescuing() {
        let config = OptimizationConfig { sanitize_enabled: false, sanitize_trades_threshold: 5, ..Default::default() };
        let result = result_with(2, 0.0);
        let metrics = vec!["sharpe_ratio".to_string()];
        let (values, pruned) = sanitize_objectives(&result, &config, &metrics, vec![f64::NAN]);
        assert!(pruned);
        assert!(values[0].is_nan());
    }

    #[test]
    fn sufficient_trade_count_prunes_non_finite_objectives_even_when_sanitization_enabled() {
        let config = OptimizationConfig { sanitize_enabled: true, sanitize_trades_threshold: 5, ..Default::default() };
        let result = result_with(50, 0.0);
        let metrics = vec!["sharpe_ratio".to_string()];
        let (_, pruned) = sanitize_objectives(&result, &config, &metrics, vec![f64::INFINITY]);
        assert!(pruned);
    }

    #[test]
    fn infinite_profit_factor_always_prunes() {
        let config = OptimizationConfig { sanitize_enabled: true, sanitize_trades_threshold: 5, ..Default::default() };
        let result = result_with(2, 10.0);
        let metrics = vec!["profit_factor".to_string()];
        let (values, pruned) = sanitize_objectives(&result, &config, &metrics, vec![f64::INFINITY]);
        assert!(pruned);
        assert_eq!(values[0], f64::INFINITY);
    }

    #[test]
    fn finite_objectives_pass_through_untouched() {
        let config = OptimizationConfig::default();
        let result = result_with(50, 10.0);
        let metrics = vec!["sharpe_ratio".to_string()];
        let (values, pruned) = sanitize_objectives(&result, &config, &metrics, vec![1.23]);
        assert!(!pruned);
        assert_eq!(values[0], 1.23);
    }
}
