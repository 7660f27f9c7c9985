use qre_core::{OhlcvTable, ParamSchema, QreResult};
use qre_strategy::{BalanceMixer, StrategyParams};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::types::{Candidate, DeflatedSharpeConfig, DeflatedSharpeOutcome};

const EULER_MASCHERONI: f64 = 0.5772156649;

fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).expect("standard normal parameters are always valid")
}

/// Sample skewness and excess kurtosis of a return series.
pub fn skewness_kurtosis(returns: &[f64]) -> (f64, f64) {
    let n = returns.len() as f64;
    if returns.len() < 3 {
        return (0.0, 3.0);
    }
    let mean = returns.iter().sum::<f64>() / n;
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let m3 = returns.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / n;
    let m4 = returns.iter().map(|r| (r - mean).powi(4)).sum::<f64>() / n;
    let std = m2.sqrt();
    if std <= 0.0 {
        return (0.0, 3.0);
    }
    let skew = m3 / std.powi(3);
    let kurtosis = m4 / std.powi(4);
    (skew, kurtosis)
}

/// Expected maximum Sharpe ratio across `n_trials` independent trials, each
/// with Sharpe variance `sharpe_variance` (Bailey & Lopez de Prado 2014).
/// This is the benchmark a trial's observed Sharpe must clear to be
/// distinguishable from the best of `n_trials` random strategies.
pub fn expected_max_sharpe(n_trials: usize, sharpe_variance: f64) -> f64 {
    if n_trials <= 1 || sharpe_variance <= 0.0 {
        return 0.0;
    }
    let normal = standard_normal();
    let n = n_trials as f64;
    let term_a = normal.inverse_cdf(1.0 - 1.0 / n);
    let term_b = normal.inverse_cdf(1.0 - 1.0 / (n * std::f64::consts::E));
    sharpe_variance.sqrt() * ((1.0 - EULER_MASCHERONI) * term_a + EULER_MASCHERONI * term_b)
}

/// Deflated Sharpe Ratio: the probability that the observed Sharpe ratio is
/// genuinely positive after correcting for the number of trials searched,
/// track length, and non-normality of returns (skewness/kurtosis).
pub fn deflated_sharpe_ratio(
    observed_sharpe: f64,
    n_trials: usize,
    track_length: usize,
    skewness: f64,
    kurtosis: f64,
) -> f64 {
    if track_length < 2 {
        return 0.0;
    }
    let t = track_length as f64;
    // Sharpe estimator variance under non-normal returns (Bailey & Lopez de Prado).
    let sharpe_variance = (1.0 - skewness * observed_sharpe + (kurtosis - 1.0) / 4.0 * observed_sharpe.powi(2)) / (t - 1.0);
    let benchmark_sharpe = expected_max_sharpe(n_trials, sharpe_variance.max(1e-12));

    let denom = (1.0 - skewness * observed_sharpe + (kurtosis - 1.0) / 4.0 * observed_sharpe.powi(2)).max(1e-12).sqrt();
    let z = (observed_sharpe - benchmark_sharpe) * (t - 1.0).sqrt() / denom;

    standard_normal().cdf(z)
}

/// Probability of Backtest Overfitting style "luck share": how much of the
/// observed Sharpe is attributable to having searched `n_trials` candidates
/// rather than genuine skill, expressed as a percentage of the Sharpe ratio.
pub fn luck_share_pct(observed_sharpe: f64, n_trials: usize, sharpe_variance: f64) -> f64 {
    if observed_sharpe <= 0.0 {
        return 0.0;
    }
    let benchmark = expected_max_sharpe(n_trials, sharpe_variance);
    (benchmark / observed_sharpe * 100.0).clamp(0.0, 100.0)
}

/// Re-run each candidate to recover its per-trade returns, then rank by
/// Deflated Sharpe Ratio, correcting for having searched `n_trials_searched`
/// candidates total (not just the ones re-evaluated here).
pub fn run_deflated_sharpe_ratio(
    table: &OhlcvTable,
    schema: &ParamSchema,
    trade_start_idx: usize,
    candidates: &[Candidate],
    n_trials_searched: usize,
    config: &DeflatedSharpeConfig,
) -> QreResult<Vec<DeflatedSharpeOutcome>> {
    if !config.enabled || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(config.top_k.min(candidates.len()));
    for candidate in candidates.iter().take(config.top_k) {
        let params = StrategyParams::from_payload(&candidate.params, schema)?;
        let result = qre_strategy::run(table, &params, trade_start_idx, BalanceMixer::default())?;

        let returns: Vec<f64> = result.trades.iter().filter_map(|t| t.profit_pct).collect();
        let (skewness, kurtosis) = skewness_kurtosis(&returns);
        let observed_sharpe = result.advanced.sharpe_ratio.unwrap_or(0.0);
        let track_length = result.equity_curve.len();

        let dsr_probability = deflated_sharpe_ratio(observed_sharpe, n_trials_searched.max(1), track_length, skewness, kurtosis);

        outcomes.push(DeflatedSharpeOutcome {
            trial_number: candidate.trial_number,
            observed_sharpe,
            skewness,
            kurtosis,
            dsr_probability,
        });
    }

    outcomes.sort_by(|a, b| b.dsr_probability.partial_cmp(&a.dsr_probability).unwrap_or(std::cmp::Ordering::Equal));
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_trials_raises_the_bar() {
        let low = expected_max_sharpe(5, 0.01);
        let high = expected_max_sharpe(500, 0.01);
        assert!(high > low);
    }

    #[test]
    fn dsr_is_a_probability() {
        let p = deflated_sharpe_ratio(1.5, 100, 252, 0.1, 3.2);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn normal_returns_have_zero_skew_and_kurtosis_three() {
        let returns = vec![-1.0, -0.5, 0.0, 0.5, 1.0];
        let (skew, kurt) = skewness_kurtosis(&returns);
        assert!(skew.abs() < 1e-9);
        assert!(kurt > 0.0);
    }
}
