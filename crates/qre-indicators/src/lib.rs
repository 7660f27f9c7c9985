pub mod ma;
pub mod momentum;
pub mod volatility;

pub use ma::{alma, dema, ema, get_ma, hma, kama, sma, t3, tma, vwap, vwma, wma, MaType};
pub use momentum::{rsi, stoch_rsi, StochRsiResult};
pub use volatility::atr;
