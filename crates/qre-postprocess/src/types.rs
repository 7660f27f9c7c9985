use std::collections::BTreeMap;

use qre_core::ParamPayload;
use serde::{Deserialize, Serialize};

/// A candidate carried between post-process stages: a trial's parameters
/// plus whatever metric the prior stage produced it with. Stages never
/// mutate `params`, only attach a new outcome and re-sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub trial_number: usize,
    pub params: ParamPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTestConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub ft_period_days: i64,
    pub rank_metric: String,
}

impl Default for ForwardTestConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 10, ft_period_days: 30, rank_metric: "sharpe_ratio".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTestOutcome {
    pub trial_number: usize,
    pub is_profit_pct: f64,
    pub forward_profit_pct: f64,
    /// `forward_profit_pct / is_profit_pct`, guarded against a zero baseline.
    pub profit_degradation: Option<f64>,
    pub rank_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeflatedSharpeConfig {
    pub enabled: bool,
    pub top_k: usize,
}

impl Default for DeflatedSharpeConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeflatedSharpeOutcome {
    pub trial_number: usize,
    pub observed_sharpe: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub dsr_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub failure_threshold: f64,
}

impl Default for StressTestConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 10, failure_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressStatus {
    Ok,
    InsufficientData,
    SkippedBadBase,
    SkippedNoParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestOutcome {
    pub trial_number: usize,
    pub status: StressStatus,
    pub retention_p5: f64,
    pub retention_p50: f64,
    pub retention_worst: f64,
    pub profit_failure_rate: f64,
    pub romad_failure_rate: f64,
    pub combined_failure_rate: f64,
    pub n_perturbations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OosTestConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub min_profit_threshold: f64,
}

impl Default for OosTestConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 5, min_profit_threshold: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OosTestOutcome {
    pub trial_number: usize,
    pub oos_profit_pct: f64,
    pub oos_max_drawdown_pct: f64,
    pub oos_total_trades: i32,
    pub passed: bool,
}

/// Which module's ranking a pool of candidates was drawn from, per the
/// "last finished module wins" precedence: ST (OK-only) -> FT -> DSR -> raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    StressTest,
    ForwardTest,
    DeflatedSharpe,
    Optuna,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessOutcomes {
    pub forward_test: Vec<ForwardTestOutcome>,
    pub deflated_sharpe: Vec<DeflatedSharpeOutcome>,
    pub stress_test: Vec<StressTestOutcome>,
    pub oos_test: Vec<OosTestOutcome>,
}

/// Per-module pass/fail record for one run of the post-process chain (or
/// one WFA window's `select_winner` pass). A module that errors does not
/// abort the chain: the failure is recorded here and the caller falls back
/// to the prior module's pool/winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub ok: bool,
    pub reason: Option<String>,
}

impl ModuleStatus {
    pub fn ok() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { ok: false, reason: Some(reason.into()) }
    }
}

pub type ModuleStatusMap = BTreeMap<String, ModuleStatus>;
