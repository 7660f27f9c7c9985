use qre_core::{ParamPayload, ParamSchema, ParamSpec, ParamType, ParamValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::TrialRecord;

fn sample_spec(spec: &ParamSpec, rng: &mut impl Rng) -> ParamValue {
    match spec.param_type {
        ParamType::Bool => ParamValue::Bool(rng.gen_bool(0.5)),
        ParamType::Categorical => {
            let options = spec.optimize.options.clone().or_else(|| spec.options.clone()).unwrap_or_default();
            if options.is_empty() {
                spec.default.clone()
            } else {
                let idx = rng.gen_range(0..options.len());
                ParamValue::String(options[idx].clone())
            }
        }
        ParamType::Int | ParamType::Float => {
            let min = spec.optimize.min.unwrap_or(0.0);
            let max = spec.optimize.max.unwrap_or(min + 1.0);
            let v = if max > min { rng.gen_range(min..=max) } else { min };
            let v = if spec.param_type == ParamType::Int { v.round() } else { v };
            ParamValue::Number(v)
        }
        ParamType::Timestamp => spec.default.clone(),
    }
}

/// Sample every `ParamSpec` in `schema` marked optimizable; non-optimizable
/// entries keep their declared default.
pub trait Sampler: Send {
    fn suggest(&mut self, schema: &ParamSchema, history: &[TrialRecord], trial_number: usize) -> ParamPayload;
}

fn defaults_with(schema: &ParamSchema, sampled: impl Fn(&ParamSpec) -> ParamValue) -> ParamPayload {
    schema
        .specs
        .iter()
        .map(|s| {
            let v = if s.optimize.enabled { sampled(s) } else { s.default.clone() };
            (s.name.clone(), v)
        })
        .collect()
}

/// Uniform-random sampling over each parameter's declared range.
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Sampler for RandomSampler {
    fn suggest(&mut self, schema: &ParamSchema, _history: &[TrialRecord], _trial_number: usize) -> ParamPayload {
        let rng = &mut self.rng;
        defaults_with(schema, |s| sample_spec(s, rng))
    }
}

/// Deterministic space-filling design: stratifies each optimizable
/// dimension into `n_trials`-sized bins using a Van der Corput sequence per
/// dimension (a different prime radix per parameter index), guaranteeing
/// even coverage rather than the clustering random sampling can produce.
pub struct CoverageSampler;

fn van_der_corput(mut n: usize, base: usize) -> f64 {
    let mut result = 0.0;
    let mut denom = 1.0;
    while n > 0 {
        denom *= base as f64;
        result += (n % base) as f64 / denom;
        n /= base;
    }
    result
}

const PRIMES: [usize; 16] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

impl Sampler for CoverageSampler {
    fn suggest(&mut self, schema: &ParamSchema, _history: &[TrialRecord], trial_number: usize) -> ParamPayload {
        let mut dim = 0;
        defaults_with(schema, |s| {
            let base = PRIMES[dim % PRIMES.len()];
            dim += 1;
            let u = van_der_corput(trial_number + 1, base);
            match s.param_type {
                ParamType::Bool => ParamValue::Bool(u >= 0.5),
                ParamType::Categorical => {
                    let options = s.optimize.options.clone().or_else(|| s.options.clone()).unwrap_or_default();
                    if options.is_empty() {
                        s.default.clone()
                    } else {
                        let idx = ((u * options.len() as f64) as usize).min(options.len() - 1);
                        ParamValue::String(options[idx].clone())
                    }
                }
                ParamType::Int | ParamType::Float => {
                    let min = s.optimize.min.unwrap_or(0.0);
                    let max = s.optimize.max.unwrap_or(min + 1.0);
                    let mut v = min + u * (max - min);
                    if s.param_type == ParamType::Int {
                        v = v.round();
                    }
                    ParamValue::Number(v)
                }
                ParamType::Timestamp => s.default.clone(),
            }
        })
    }
}

fn trial_score(trial: &TrialRecord) -> f64 {
    trial.composite_score.unwrap_or(trial.objective_values.first().copied().unwrap_or(f64::NEG_INFINITY))
}

/// Tree-structured Parzen Estimator: splits completed trials at the
/// `gamma` quantile by composite score, then for each numeric parameter
/// draws candidates and keeps the one whose "good" density most exceeds its
/// "bad" density (estimated with a simple Gaussian kernel around each
/// group's observed values).
pub struct TpeSampler {
    rng: StdRng,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), gamma: 0.25, n_candidates: 24 }
    }

    fn good_bad_values(&self, history: &[TrialRecord], extract: impl Fn(&ParamPayload) -> Option<f64>) -> (Vec<f64>, Vec<f64>) {
        let mut scored: Vec<(f64, f64)> = history
            .iter()
            .filter(|t| !t.pruned)
            .filter_map(|t| extract(&t.params).map(|v| (trial_score(t), v)))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let split = ((scored.len() as f64 * self.gamma).ceil() as usize).max(1).min(scored.len());
        let good = scored[..split].iter().map(|(_, v)| *v).collect();
        let bad = scored[split..].iter().map(|(_, v)| *v).collect();
        (good, bad)
    }

    fn density(values: &[f64], x: f64, bandwidth: f64) -> f64 {
        if values.is_empty() {
            return 1e-6;
        }
        let n = values.len() as f64;
        values.iter().map(|v| (-((x - v).powi(2)) / (2.0 * bandwidth * bandwidth)).exp()).sum::<f64>() / n
    }
}

impl Sampler for TpeSampler {
    fn suggest(&mut self, schema: &ParamSchema, history: &[TrialRecord], _trial_number: usize) -> ParamPayload {
        let enough_history = history.iter().filter(|t| !t.pruned).count() >= 10;

        let mut payload = ParamPayload::new();
        for spec in &schema.specs {
            if !spec.optimize.enabled {
                payload.insert(spec.name.clone(), spec.default.clone());
                continue;
            }
            if !enough_history || spec.param_type == ParamType::Categorical || spec.param_type == ParamType::Bool {
                payload.insert(spec.name.clone(), sample_spec(spec, &mut self.rng));
                continue;
            }

            let name = spec.name.clone();
            let (good, bad) = self.good_bad_values(history, |p| p.get(&name).and_then(ParamValue::as_f64));
            let min = spec.optimize.min.unwrap_or(0.0);
            let max = spec.optimize.max.unwrap_or(min + 1.0);
            let span = (max - min).max(1e-9);
            let bandwidth = (span / 10.0).max(1e-6);

            let mut best_x = min;
            let mut best_ratio = f64::NEG_INFINITY;
            for _ in 0..self.n_candidates {
                let x = if !good.is_empty() && self.rng.gen_bool(0.7) {
                    let base = good[self.rng.gen_range(0..good.len())];
                    (base + self.rng.gen_range(-bandwidth..bandwidth)).clamp(min, max)
                } else {
                    self.rng.gen_range(min..=max)
                };
                let l = Self::density(&good, x, bandwidth) + 1e-9;
                let g = Self::density(&bad, x, bandwidth) + 1e-9;
                let ratio = l / g;
                if ratio > best_ratio {
                    best_ratio = ratio;
                    best_x = x;
                }
            }
            if spec.param_type == ParamType::Int {
                best_x = best_x.round();
            }
            payload.insert(spec.name.clone(), ParamValue::Number(best_x));
        }
        payload
    }
}
