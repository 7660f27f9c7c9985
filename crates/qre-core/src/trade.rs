use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a closed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

/// A closed round-trip position.
///
/// Invariants (spec §3): `exit_time >= entry_time`, `size > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    /// Gross P&L minus entry+exit commissions.
    pub net_pnl: f64,
    /// Net P&L as a percentage of entry notional, when entry notional is nonzero.
    pub profit_pct: Option<f64>,
}

impl TradeRecord {
    pub fn is_valid(&self) -> bool {
        self.exit_time >= self.entry_time && self.size > 0.0
    }
}
