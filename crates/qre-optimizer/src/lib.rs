pub mod dominance;
pub mod genetic;
pub mod pruning;
pub mod sampler;
pub mod sanitize;
pub mod score;
pub mod types;
pub mod worker;

use std::time::{Duration, Instant};

use qre_core::{OhlcvTable, ParamSchema, QreResult};

pub use dominance::{crowding_distance, non_dominated_sort};
pub use genetic::{Nsga2Sampler, Nsga3Sampler};
pub use pruning::{MedianPruner, NoopPruner, PatientPruner, PercentilePruner, Pruner};
pub use sampler::{CoverageSampler, RandomSampler, Sampler, TpeSampler};
pub use score::composite_scores;
pub use types::*;

fn build_sampler(config: &OptimizationConfig, seed: u64) -> Box<dyn Sampler> {
    match config.sampler {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::Tpe => Box::new(TpeSampler::new(seed)),
        SamplerType::Coverage => Box::new(CoverageSampler),
        SamplerType::Nsga2 => Box::new(Nsga2Sampler::new(seed, config.population_size, config.crossover_prob, config.mutation_prob)),
        SamplerType::Nsga3 => Box::new(Nsga3Sampler::new(seed, config.population_size, config.crossover_prob, config.mutation_prob)),
    }
}

fn build_pruner(config: &OptimizationConfig) -> Box<dyn Pruner> {
    match config.pruner {
        PrunerType::None => Box::new(NoopPruner),
        PrunerType::Median => Box::new(MedianPruner { n_warmup_steps: 0 }),
        PrunerType::Percentile => Box::new(PercentilePruner { percentile: 25.0, n_warmup_steps: 0 }),
        PrunerType::Patient => Box::new(PatientPruner::new(Box::new(MedianPruner { n_warmup_steps: 0 }), 3)),
    }
}

/// The result of a completed optimization study: every evaluated trial plus
/// which of them sit on the Pareto front.
#[derive(Debug, Clone, Default)]
pub struct OptimizationRun {
    pub trials: Vec<TrialRecord>,
    pub pareto_indices: Vec<usize>,
    pub completed_trials: usize,
    pub pruned_trials: usize,
}

/// Drive a full optimization study over `table` using `config`'s sampler,
/// pruner, and budget, evaluating each round's batch of candidates
/// concurrently via the bounded worker pool.
pub struct Optimizer {
    config: OptimizationConfig,
    seed: u64,
}

impl Optimizer {
    pub fn new(config: OptimizationConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn run(&self, table: &OhlcvTable, schema: &ParamSchema, trade_start_idx: usize) -> QreResult<OptimizationRun> {
        let mut sampler = build_sampler(&self.config, self.seed);
        let mut pruner = build_pruner(&self.config);

        let mut trials: Vec<TrialRecord> = Vec::new();
        let batch_size = self.config.clamped_workers();
        let start = Instant::now();
        let time_limit = self.config.time_limit_secs.map(Duration::from_secs);

        let mut best_score = f64::NEG_INFINITY;
        let mut rounds_without_improvement = 0usize;

        loop {
            if self.budget_exhausted(trials.len(), start, time_limit, rounds_without_improvement) {
                break;
            }

            let remaining = match self.config.budget_mode {
                BudgetMode::Trials => batch_size.min(self.config.n_trials.saturating_sub(trials.len())),
                _ => batch_size,
            };
            if remaining == 0 {
                break;
            }

            let payloads = (0..remaining)
                .map(|i| sampler.suggest(schema, &trials, trials.len() + i))
                .collect::<Vec<_>>();

            let start_trial_number = trials.len();
            let mut batch = worker::evaluate_batch(table, schema, trade_start_idx, start_trial_number, payloads, &self.config)?;

            let scores = composite_scores(&batch, &self.config.objectives, &self.config.score_config);
            let completed_scores: Vec<f64> = trials.iter().filter_map(|t| t.composite_score).collect();
            for (trial, score) in batch.iter_mut().zip(scores.into_iter()) {
                trial.composite_score = score;
                let value = score.unwrap_or(f64::NEG_INFINITY);
                trial.pruned = pruner.should_prune(0, value, &completed_scores);
            }

            trials.extend(batch);

            let round_best = trials.iter().filter_map(|t| t.composite_score).fold(f64::NEG_INFINITY, f64::max);
            if round_best > best_score + 1e-9 {
                best_score = round_best;
                rounds_without_improvement = 0;
            } else {
                rounds_without_improvement += 1;
            }

            if trials.is_empty() {
                // Every candidate in the batch was sanitized away; avoid spinning forever.
                if start.elapsed() > Duration::from_secs(30) {
                    break;
                }
            }
        }

        let ranks = non_dominated_sort(&trials, &self.config.objectives);
        for (trial, rank) in trials.iter_mut().zip(ranks.iter()) {
            trial.dominance_rank = *rank;
            trial.is_pareto_optimal = *rank == 0 && trial.constraints_satisfied;
        }
        let pareto_indices: Vec<usize> = trials.iter().enumerate().filter(|(_, t)| t.is_pareto_optimal).map(|(i, _)| i).collect();
        let pruned_trials = trials.iter().filter(|t| t.pruned).count();

        Ok(OptimizationRun { completed_trials: trials.len(), pruned_trials, trials, pareto_indices })
    }

    fn budget_exhausted(&self, completed: usize, start: Instant, time_limit: Option<Duration>, rounds_without_improvement: usize) -> bool {
        match self.config.budget_mode {
            BudgetMode::Trials => completed >= self.config.n_trials,
            BudgetMode::TimeLimit => time_limit.map(|limit| start.elapsed() >= limit).unwrap_or(completed >= self.config.n_trials),
            BudgetMode::Convergence => rounds_without_improvement >= self.config.convergence_patience || completed >= self.config.n_trials * 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use qre_core::Bar;

    fn synthetic_table(n: usize) -> OhlcvTable {
        let mut bars = Vec::with_capacity(n);
        let mut price = 100.0_f64;
        for i in 0..n {
            price += ((i as f64) * 0.2).sin() * 0.6 + 0.03;
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
    fn runs_a_small_random_study() {
        let table = synthetic_table(600);
        let schema = qre_strategy::schema();
        let config = OptimizationConfig {
            sampler: SamplerType::Random,
            n_trials: 6,
            max_workers: 2,
            sanitize_enabled: false,
            ..OptimizationConfig::default()
        };
        let optimizer = Optimizer::new(config, 7);
        let run = optimizer.run(&table, &schema, 0).unwrap();
        assert_eq!(run.completed_trials, 6);
        assert!(!run.pareto_indices.is_empty());
    }
}
