use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied metadata that goes on the `studies` row but isn't part of
/// an `OptimizationRun`/`WfaResult` (strategy identity, dataset provenance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyMeta {
    pub strategy_id: String,
    pub strategy_version: Option<String>,
    pub csv_file_path: String,
    pub csv_file_name: String,
    pub dataset_start_date: DateTime<Utc>,
    pub dataset_end_date: DateTime<Utc>,
}

/// The subset of a study's header fields needed to list and re-open it,
/// without pulling every trial into memory.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudySummary {
    pub study_id: String,
    pub study_name: String,
    pub strategy_id: String,
    pub optimization_mode: String,
    pub total_trials: i64,
    pub completed_trials: i64,
    pub pruned_trials: i64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedStudy {
    pub summary: StudySummary,
    pub trials: Vec<LoadedTrial>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedTrial {
    pub trial_number: i64,
    pub params_json: String,
    pub composite_score: Option<f64>,
    pub is_pareto_optimal: bool,
    pub constraints_satisfied: bool,
    pub net_profit_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub sharpe_ratio: Option<f64>,
}
