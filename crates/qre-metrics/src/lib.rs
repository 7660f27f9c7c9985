pub mod advanced;
pub mod basic;

pub use advanced::calculate_advanced;
pub use basic::{calculate_basic, max_drawdown_pct};

use qre_core::StrategyResult;

/// Compute both metric tiers and attach them to `result`, keeping strategy
/// execution and metric calculation as separate concerns.
pub fn enrich_strategy_result(mut result: StrategyResult, initial_balance: f64, risk_free_rate: f64) -> StrategyResult {
    result.basic = calculate_basic(&result, initial_balance);
    result.advanced = calculate_advanced(&result, initial_balance, risk_free_rate);
    result
}
