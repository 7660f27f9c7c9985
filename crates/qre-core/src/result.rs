use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trade::TradeRecord;

/// Basic performance metrics computed from `balance_curve` + the trade ledger.
///
/// `None` fields are used wherever the underlying computation is degenerate
/// (e.g. zero trades) rather than a sentinel NaN/∞, matching the spec's
/// "optional metric propagation" guidance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub net_profit: f64,
    pub net_profit_pct: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub win_rate: f64,
    pub max_consecutive_losses: i32,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

/// Advanced performance metrics computed from the equity curve + trade ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub profit_factor: Option<f64>,
    pub romad: Option<f64>,
    pub ulcer_index: Option<f64>,
    pub sqn: Option<f64>,
    pub consistency_score: Option<f64>,
    pub recovery_factor: Option<f64>,
}

/// The output of one deterministic strategy run.
///
/// Invariant: `equity_curve.len() == balance_curve.len() == timestamps.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyResult {
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub balance_curve: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub basic: BasicMetrics,
    #[serde(default)]
    pub advanced: AdvancedMetrics,
}

impl StrategyResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_consistent(&self) -> bool {
        self.equity_curve.len() == self.balance_curve.len()
            && self.balance_curve.len() == self.timestamps.len()
    }
}
