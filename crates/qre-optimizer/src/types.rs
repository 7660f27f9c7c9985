use qre_core::ParamPayload;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

/// One scalar the optimizer is trying to improve, read off a trial's
/// `StrategyResult` metrics by name (e.g. `"sharpe_ratio"`, `"max_drawdown_pct"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub metric: String,
    pub direction: Direction,
}

/// A feasibility requirement on a metric; trials that fail any constraint
/// are excluded from the Pareto front and ranked below all feasible trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub metric: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Constraint {
    pub fn is_satisfied(&self, value: f64) -> bool {
        self.min.map(|m| value >= m).unwrap_or(true) && self.max.map(|m| value <= m).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    Random,
    Tpe,
    Nsga2,
    Nsga3,
    Coverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunerType {
    None,
    Median,
    Percentile,
    Patient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    Trials,
    TimeLimit,
    Convergence,
}

/// Percentile normalization ranks each objective's values and maps them to
/// `[0, 1]`; minmax rescales linearly between the observed min and max.
/// Percentile is more robust to outliers, minmax preserves relative spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    Percentile,
    MinMax,
}

/// Fixed `(min, max)` clamp range for one composite metric, keyed by the
/// same metric name used in `objectives`/`metric_value`. `minmax`
/// normalization clamps raw values to `[min, max]` before rescaling to
/// `[0, 100]`, independent of whatever else is in the trial batch. `enabled`
/// excludes the metric from the composite entirely (weights renormalize
/// over the remainder); `invert` subtracts the normalized value from 100
/// after clamping, for metrics where lower is better (e.g. Ulcer Index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBounds {
    pub metric: String,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub invert: bool,
}

fn default_true() -> bool {
    true
}

fn default_metric_bounds() -> Vec<MetricBounds> {
    vec![
        MetricBounds { metric: "romad".into(), min: 0.0, max: 5.0, enabled: true, invert: false },
        MetricBounds { metric: "sharpe_ratio".into(), min: -3.0, max: 5.0, enabled: true, invert: false },
        MetricBounds { metric: "profit_factor".into(), min: 0.0, max: 5.0, enabled: true, invert: false },
        MetricBounds { metric: "ulcer_index".into(), min: 0.0, max: 50.0, enabled: true, invert: true },
        MetricBounds { metric: "sqn".into(), min: -3.0, max: 7.0, enabled: true, invert: false },
        MetricBounds { metric: "consistency_score".into(), min: 0.0, max: 100.0, enabled: true, invert: false },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub normalization: ScoreNormalization,
    /// Per-objective weight, same order as `objectives`; defaults to equal
    /// weighting when empty.
    #[serde(default)]
    pub weights: Vec<f64>,
    /// Per-metric clamp bounds used by `minmax` normalization. Metrics not
    /// named here fall back to the raw oriented value clamped to `[0, 1]`.
    #[serde(default = "default_metric_bounds")]
    pub bounds: Vec<MetricBounds>,
}

impl ScoreConfig {
    pub fn bounds_for(&self, metric: &str) -> Option<&MetricBounds> {
        self.bounds.iter().find(|b| b.metric == metric)
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self { normalization: ScoreNormalization::Percentile, weights: Vec::new(), bounds: default_metric_bounds() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    pub sampler: SamplerType,
    pub pruner: PrunerType,
    pub budget_mode: BudgetMode,
    pub n_trials: usize,
    pub time_limit_secs: Option<u64>,
    pub convergence_patience: usize,
    /// Genetic samplers only.
    pub population_size: usize,
    pub crossover_prob: f64,
    pub mutation_prob: f64,
    pub score_config: ScoreConfig,
    /// Worker pool size, clamped to `[1, 32]` per the concurrency model.
    pub max_workers: usize,
    pub filter_min_profit: bool,
    pub min_profit_threshold: f64,
    pub sanitize_enabled: bool,
    pub sanitize_trades_threshold: i32,
}

impl OptimizationConfig {
    pub fn clamped_workers(&self) -> usize {
        self.max_workers.clamp(1, 32)
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            objectives: vec![Objective { metric: "sharpe_ratio".into(), direction: Direction::Maximize }],
            constraints: Vec::new(),
            sampler: SamplerType::Tpe,
            pruner: PrunerType::Median,
            budget_mode: BudgetMode::Trials,
            n_trials: 100,
            time_limit_secs: None,
            convergence_patience: 20,
            population_size: 40,
            crossover_prob: 0.9,
            mutation_prob: 0.1,
            score_config: ScoreConfig::default(),
            max_workers: 8,
            filter_min_profit: false,
            min_profit_threshold: 0.0,
            sanitize_enabled: true,
            sanitize_trades_threshold: 5,
        }
    }
}

/// One evaluated point in the search space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_number: usize,
    pub params: ParamPayload,
    pub objective_values: Vec<f64>,
    pub constraints_satisfied: bool,
    pub constraint_values: Vec<f64>,
    pub composite_score: Option<f64>,
    pub is_pareto_optimal: bool,
    pub dominance_rank: usize,
    pub pruned: bool,
}
