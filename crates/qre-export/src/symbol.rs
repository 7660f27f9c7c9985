use std::path::Path;

use chrono::{DateTime, Utc};

/// Strip a trailing `YYYY.MM.DD`/`YYYY-MM-DD` date range and return what's
/// left of the filename stem (exchange, ticker, timeframe). Falls back to
/// the full stem when no date pattern is found.
pub fn extract_file_prefix(csv_filename: &str) -> String {
    let stem = Path::new(csv_filename).file_stem().and_then(|s| s.to_str()).unwrap_or(csv_filename);

    let bytes = stem.as_bytes();
    for start in 0..bytes.len() {
        if let Some(end) = match_date_token(&stem[start..]) {
            let _ = end;
            let prefix = stem[..start].trim_end();
            return if prefix.is_empty() { stem.to_string() } else { prefix.to_string() };
        }
    }
    stem.to_string()
}

/// Matches `\d{4}[.\-/]\d{2}[.\-/]\d{2}` at the start of `s`, returning the
/// match length if found.
fn match_date_token(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 10 {
        return None;
    }
    let is_digit = |c: char| c.is_ascii_digit();
    let is_sep = |c: char| c == '.' || c == '-' || c == '/';
    if chars[0..4].iter().all(|c| is_digit(*c))
        && is_sep(chars[4])
        && chars[5..7].iter().all(|c| is_digit(*c))
        && is_sep(chars[7])
        && chars[8..10].iter().all(|c| is_digit(*c))
    {
        Some(10)
    } else {
        None
    }
}

/// `"OKX_LINKUSDT.P, 15 2025.02.01-2025.09.09.csv"` -> `"OKX:LINKUSDT.P"`.
/// Prefix is everything before the first `_`; ticker is everything after
/// until the first `,` (or the first whitespace run if there's no comma).
pub fn extract_symbol_from_csv_filename(csv_filename: &str) -> String {
    let name = Path::new(csv_filename).file_name().and_then(|s| s.to_str()).unwrap_or(csv_filename);

    let Some((prefix, remainder)) = name.split_once('_') else {
        return "UNKNOWN:UNKNOWN".to_string();
    };

    let ticker = if let Some((head, _)) = remainder.split_once(',') {
        head.trim().to_string()
    } else {
        remainder.split_whitespace().next().unwrap_or("UNKNOWN").to_string()
    };

    format!("{prefix}:{ticker}")
}

/// `"OKX_LINKUSDT.P, 15.csv", 2025-05-01, 2025-09-01 -> "OKX_LINKUSDT.P, 15 2025.05.01-2025.09.01_Optuna+WFA.csv"`.
pub fn generate_wfa_output_filename(csv_filename: &str, start: DateTime<Utc>, end: DateTime<Utc>, include_trades: bool) -> String {
    let prefix = extract_file_prefix(csv_filename);
    let prefix = if prefix.is_empty() { "wfa".to_string() } else { prefix };

    let mode = if include_trades { "Optuna+WFA_TRADES" } else { "Optuna+WFA" };
    let ext = if include_trades { "zip" } else { "csv" };

    format!("{} {}-{}_{}.{}", prefix, start.format("%Y.%m.%d"), end.format("%Y.%m.%d"), mode, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_symbol_from_comma_delimited_filename() {
        let name = "OKX_LINKUSDT.P, 15 2025.02.01-2025.09.09.csv";
        assert_eq!(extract_symbol_from_csv_filename(name), "OKX:LINKUSDT.P");
    }

    #[test]
    fn extracts_symbol_without_date_range() {
        assert_eq!(extract_symbol_from_csv_filename("BINANCE_BTCUSDT, 1h.csv"), "BINANCE:BTCUSDT");
    }

    #[test]
    fn falls_back_to_unknown_without_underscore() {
        assert_eq!(extract_symbol_from_csv_filename("btcusdt.csv"), "UNKNOWN:UNKNOWN");
    }

    #[test]
    fn strips_trailing_date_range_from_prefix() {
        assert_eq!(extract_file_prefix("OKX_LINKUSDT.P, 15 2025.02.01-2025.09.09.csv"), "OKX_LINKUSDT.P, 15");
    }

    #[test]
    fn prefix_falls_back_to_stem_without_date_range() {
        assert_eq!(extract_file_prefix("BINANCE_BTCUSDT, 1h.csv"), "BINANCE_BTCUSDT, 1h");
    }

    #[test]
    fn builds_wfa_output_filename() {
        let start = DateTime::parse_from_rfc3339("2025-05-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2025-09-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let name = generate_wfa_output_filename("OKX_LINKUSDT.P, 15.csv", start, end, false);
        assert_eq!(name, "OKX_LINKUSDT.P, 15 2025.05.01-2025.09.01_Optuna+WFA.csv");

        let zip_name = generate_wfa_output_filename("OKX_LINKUSDT.P, 15.csv", start, end, true);
        assert_eq!(zip_name, "OKX_LINKUSDT.P, 15 2025.05.01-2025.09.01_Optuna+WFA_TRADES.zip");
    }
}
