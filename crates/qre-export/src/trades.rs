use qre_core::{Direction, QreError, QreResult, TradeRecord};

const TRADE_CSV_HEADER: [&str; 9] =
    ["Symbol", "Type", "Entry Time", "Entry Price", "Exit Time", "Exit Price", "Profit", "Profit %", "Size"];

/// One row per closed trade, TradingView-compatible. `symbol` is stamped
/// onto every row (a single CSV covers one instrument at a time).
pub fn write_trades_csv(trades: &[TradeRecord], symbol: &str) -> QreResult<String> {
    let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(vec![]);
    writer.write_record(TRADE_CSV_HEADER).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;

    for trade in trades {
        let direction = match trade.direction {
            Direction::Short => "Short",
            Direction::Long => "Long",
        };
        writer
            .write_record([
                symbol,
                direction,
                &trade.entry_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                &format!("{:.2}", trade.entry_price),
                &trade.exit_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                &format!("{:.2}", trade.exit_price),
                &format!("{:.2}", trade.net_pnl),
                &format!("{:.2}%", trade.profit_pct.unwrap_or(0.0)),
                &format!("{:.2}", trade.size),
            ])
            .map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
    }

    let bytes = writer.into_inner().map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| QreError::ExecutionFailure(e.to_string()))
}

const WFA_TRADE_CSV_HEADER: [&str; 5] = ["Symbol", "Side", "Qty", "Fill Price", "Closing Time"];

/// Two rows per trade (entry fill, exit fill), the format WFA per-window
/// trade replays use instead of the single-row summary variant above.
pub fn write_wfa_trades_csv(trades: &[TradeRecord], symbol: &str) -> QreResult<String> {
    let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(vec![]);
    writer.write_record(WFA_TRADE_CSV_HEADER).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;

    for trade in trades {
        let (entry_side, exit_side) = match trade.direction {
            Direction::Long => ("Buy", "Sell"),
            Direction::Short => ("Sell", "Buy"),
        };
        writer
            .write_record([
                symbol,
                entry_side,
                &format!("{:.2}", trade.size),
                &format!("{:.2}", trade.entry_price),
                &trade.entry_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            ])
            .map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
        writer
            .write_record([
                symbol,
                exit_side,
                &format!("{:.2}", trade.size),
                &format!("{:.2}", trade.exit_price),
                &trade.exit_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            ])
            .map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
    }

    let bytes = writer.into_inner().map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| QreError::ExecutionFailure(e.to_string()))
}
