pub mod engine;
pub mod params;
pub mod warmup;

pub use engine::{run, BalanceMixer};
pub use params::{schema, StrategyParams};
pub use warmup::{default_warmup_bars, prepare_dataset_with_default_warmup, prepare_dataset_with_warmup};

/// Identity of the registered strategy implementation. Other crates (the
/// optimizer, the store) record this alongside a study so a later run can
/// confirm it is replaying results against the same algorithm.
pub const STRATEGY_ID: &str = "s01_trailing_ma";
pub const STRATEGY_VERSION: &str = "1";
