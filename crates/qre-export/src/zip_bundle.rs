use std::io::Write;

use qre_core::{QreError, QreResult, TradeRecord};
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::trades::write_trades_csv;

#[derive(Debug, Serialize)]
struct ExportSummary<'a> {
    metrics: &'a serde_json::Value,
    total_trades: usize,
    generated_at: chrono::DateTime<chrono::Utc>,
}

/// `trades.csv` + `summary.json` (metrics + generation timestamp),
/// deflate-compressed.
pub fn write_trades_zip(trades: &[TradeRecord], symbol: &str, metrics: &serde_json::Value, generated_at: chrono::DateTime<chrono::Utc>) -> QreResult<Vec<u8>> {
    let trades_csv = write_trades_csv(trades, symbol)?;
    let summary = ExportSummary { metrics, total_trades: trades.len(), generated_at };
    let summary_json = serde_json::to_string_pretty(&summary).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("trades.csv", options).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
        zip.write_all(trades_csv.as_bytes()).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;

        zip.start_file("summary.json", options).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
        zip.write_all(summary_json.as_bytes()).map_err(|e| QreError::ExecutionFailure(e.to_string()))?;

        zip.finish().map_err(|e| QreError::ExecutionFailure(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
