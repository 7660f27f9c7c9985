pub mod bar;
pub mod error;
pub mod params;
pub mod result;
pub mod trade;

pub use bar::{load_csv, resolve_csv_path, Bar, OhlcvTable};
pub use error::{QreError, QreResult};
pub use params::{OptimizeSpec, ParamPayload, ParamSchema, ParamSpec, ParamType, ParamValue};
pub use result::{AdvancedMetrics, BasicMetrics, StrategyResult};
pub use trade::{Direction, TradeRecord};
