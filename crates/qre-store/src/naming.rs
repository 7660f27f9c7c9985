use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Strip a trailing date stamp (`EXCHANGE_TICKER,TF_2024.01.01-2024.12.31`
/// style filenames) off a CSV basename, leaving just the ticker/timeframe
/// prefix used in generated study names.
fn extract_file_prefix(csv_filename: &str) -> String {
    let stem = std::path::Path::new(csv_filename).file_stem().and_then(|s| s.to_str()).unwrap_or(csv_filename);

    let bytes = stem.as_bytes();
    let is_date_at = |i: usize| -> bool {
        if i + 10 > bytes.len() {
            return false;
        }
        let chunk = &stem[i..i + 10];
        let c: Vec<char> = chunk.chars().collect();
        c.len() == 10
            && c[0].is_ascii_digit()
            && c[1].is_ascii_digit()
            && c[2].is_ascii_digit()
            && c[3].is_ascii_digit()
            && matches!(c[4], '.' | '-' | '/')
            && c[5].is_ascii_digit()
            && c[6].is_ascii_digit()
            && matches!(c[7], '.' | '-' | '/')
            && c[8].is_ascii_digit()
            && c[9].is_ascii_digit()
    };

    for i in 0..stem.len() {
        if is_date_at(i) {
            let prefix = stem[..i].trim_end();
            return if prefix.is_empty() { stem.to_string() } else { prefix.to_string() };
        }
    }
    if stem.is_empty() { "dataset".to_string() } else { stem.to_string() }
}

/// Derive the `S01`-style strategy prefix from a `strategy_id` like `s01_ema_cross`,
/// falling back to the first three uppercased characters of the id.
fn strategy_prefix(strategy_id: &str) -> String {
    let digits: String = strategy_id.strip_prefix('s').map(|rest| rest.chars().take_while(|c| c.is_ascii_digit()).collect()).unwrap_or_default();
    if !digits.is_empty() && strategy_id[1 + digits.len()..].starts_with('_') {
        format!("S{:0>2}", digits)
    } else {
        strategy_id.to_uppercase().chars().take(3).collect()
    }
}

/// Build `{PREFIX}_{TICKER_TF} {start}-{end}_{MODE}`, appending ` (n)` the
/// first time the base name collides with one of `existing`. Collision
/// detection is the caller's job (a `SELECT study_name ... LIKE` query);
/// this function is pure so it can be unit tested without a database.
pub fn generate_study_name(
    strategy_id: &str,
    csv_filename: &str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    mode: &str,
    existing: &HashSet<String>,
) -> String {
    let prefix = strategy_prefix(strategy_id);
    let ticker_tf = extract_file_prefix(csv_filename);
    let start_str = start_date.format("%Y.%m.%d");
    let end_str = end_date.format("%Y.%m.%d");
    let mode_suffix = if mode.eq_ignore_ascii_case("wfa") { "WFA" } else { "OPT" };

    let base_name = format!("{prefix}_{ticker_tf} {start_str}-{end_str}_{mode_suffix}");
    if !existing.contains(&base_name) {
        return base_name;
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base_name} ({counter})");
        if !existing.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_date_range_from_filename() {
        assert_eq!(extract_file_prefix("BINANCE_BTCUSDT, 1D_2020.01.01-2024.01.01.csv"), "BINANCE_BTCUSDT, 1D");
    }

    #[test]
    fn falls_back_to_full_stem_without_a_date() {
        assert_eq!(extract_file_prefix("my_dataset.csv"), "my_dataset");
    }

    #[test]
    fn appends_counter_on_collision() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let end = DateTime::<Utc>::from_timestamp(86400 * 30, 0).unwrap();
        let mut existing = HashSet::new();
        existing.insert("S01_dataset 1970.01.01-1970.01.31_OPT".to_string());

        let name = generate_study_name("s01_ema_cross", "dataset.csv", start, end, "optuna", &existing);
        assert_eq!(name, "S01_dataset 1970.01.01-1970.01.31_OPT (1)");
    }
}
