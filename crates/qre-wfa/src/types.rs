use chrono::{DateTime, Utc};
use qre_core::{BasicMetrics, ParamPayload};
use qre_optimizer::OptimizationConfig;
use qre_postprocess::{ModuleStatusMap, PostProcessChainConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Cusum,
    Drawdown,
    Inactivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WfaConfig {
    pub is_period_days: i64,
    pub oos_period_days: i64,
    pub adaptive_mode: bool,
    pub max_oos_period_days: i64,
    pub min_oos_trades: usize,
    pub check_interval_trades: usize,
    pub cusum_threshold: f64,
    pub dd_threshold_multiplier: f64,
    pub inactivity_multiplier: f64,
    pub store_top_n_trials: usize,
    pub optimization: OptimizationConfig,
    pub post_process: PostProcessChainConfig,
}

impl Default for WfaConfig {
    fn default() -> Self {
        Self {
            is_period_days: 365,
            oos_period_days: 90,
            adaptive_mode: false,
            max_oos_period_days: 180,
            min_oos_trades: 5,
            check_interval_trades: 3,
            cusum_threshold: 4.0,
            dd_threshold_multiplier: 1.5,
            inactivity_multiplier: 3.0,
            store_top_n_trials: 10,
            optimization: OptimizationConfig::default(),
            post_process: PostProcessChainConfig::default(),
        }
    }
}

/// Which module produced the final parameter selection for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestParamsSource {
    Optuna,
    DeflatedSharpe,
    ForwardTest,
    StressTest,
}

/// Per-module winning trial number at each stage of a window's pipeline,
/// in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionChain {
    pub optuna_winner: Option<usize>,
    pub dsr_winner: Option<usize>,
    pub forward_test_winner: Option<usize>,
    pub stress_test_winner: Option<usize>,
}

/// Telemetry recorded when an adaptive window's OOS segment is truncated
/// early by a trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptiveTelemetry {
    pub trigger_type: Option<TriggerType>,
    pub cusum_final: Option<f64>,
    pub dd_peak_pct: Option<f64>,
    pub actual_oos_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WfaWindow {
    pub window_number: usize,
    pub is_start: DateTime<Utc>,
    pub is_end: DateTime<Utc>,
    pub oos_start: DateTime<Utc>,
    /// Nominal OOS end before any adaptive truncation.
    pub oos_end_nominal: DateTime<Utc>,
    /// Actual OOS end after adaptive truncation (== nominal in fixed mode).
    pub oos_end_actual: DateTime<Utc>,
    pub best_params: ParamPayload,
    pub param_id: String,
    pub selection_chain: SelectionChain,
    pub best_params_source: BestParamsSource,
    pub is_metrics: BasicMetrics,
    pub oos_metrics: BasicMetrics,
    pub oos_equity_dense: Vec<f64>,
    pub oos_equity_compact: Vec<f64>,
    pub adaptive: AdaptiveTelemetry,
    /// Per-module pass/fail from this window's `select_winner` pass. A
    /// module recorded as failed did not abort the window; the winner
    /// fell back to the prior module's selection.
    pub module_status: ModuleStatusMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WfaStitchedResult {
    pub stitched_net_profit_pct: f64,
    pub stitched_max_drawdown_pct: f64,
    pub stitched_total_trades: i32,
    pub oos_win_rate: f64,
    pub wfe_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WfaResult {
    pub windows: Vec<WfaWindow>,
    pub stitched: WfaStitchedResult,
}
