use qre_core::{ParamSchema, ParamValue};
use qre_wfa::{WfaConfig, WfaResult};

fn format_ts(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

fn format_param_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Number(n) => {
            if *n == n.trunc() {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        ParamValue::Bool(b) => b.to_string(),
        ParamValue::String(s) => s.clone(),
    }
}

/// Summary block (stitched OOS + config) + per-window IS/OOS metric rows +
/// per-window parameter blocks, ordered by the strategy's schema.
pub fn write_wfa_csv(strategy_id: &str, config: &WfaConfig, result: &WfaResult, schema: &ParamSchema) -> String {
    let mut out = String::new();
    out.push_str("=== WALK-FORWARD ANALYSIS - RESULTS ===\n\n");

    out.push_str("=== CONFIGURATION ===\n");
    out.push_str(&format!("Strategy ID,{strategy_id}\n"));
    out.push_str(&format!("IS Period (days),{}\n", config.is_period_days));
    out.push_str(&format!("OOS Period (days),{}\n", config.oos_period_days));
    out.push_str(&format!("Total Windows,{}\n", result.windows.len()));
    out.push('\n');

    out.push_str("=== STITCHED OOS PERFORMANCE ===\n");
    out.push_str(&format!("Final OOS Net Profit %,{:.2}%\n", result.stitched.stitched_net_profit_pct));
    out.push_str(&format!("Max Drawdown %,{:.2}%\n", result.stitched.stitched_max_drawdown_pct));
    out.push_str(&format!("Total Trades,{}\n", result.stitched.stitched_total_trades));
    out.push_str(&format!("WFE (Annualized),{:.2}%\n", result.stitched.wfe_pct));
    out.push_str(&format!("OOS Win Rate,{:.1}%\n", result.stitched.oos_win_rate));
    out.push('\n');

    out.push_str("=== PER-WINDOW RESULTS ===\n");
    out.push_str("Window,IS Start,IS End,OOS Start,OOS End,Param ID,IS Net Profit %,IS Max DD %,IS Trades,OOS Net Profit %,OOS Max DD %,OOS Trades\n");
    for window in &result.windows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{:.2}%,{:.2}%,{},{:.2}%,{:.2}%,{}\n",
            window.window_number,
            format_ts(window.is_start),
            format_ts(window.is_end),
            format_ts(window.oos_start),
            format_ts(window.oos_end_actual),
            window.param_id,
            window.is_metrics.net_profit_pct,
            window.is_metrics.max_drawdown_pct,
            window.is_metrics.total_trades,
            window.oos_metrics.net_profit_pct,
            window.oos_metrics.max_drawdown_pct,
            window.oos_metrics.total_trades,
        ));
    }
    out.push('\n');

    out.push_str("=== WINDOW PARAMETERS ===\n\n");
    for window in &result.windows {
        out.push_str(&format!("--- Window #{}: {} ---\n", window.window_number, window.param_id));
        out.push_str("Parameter,Value\n");
        if schema.specs.is_empty() {
            for (name, value) in &window.best_params {
                out.push_str(&format!("{name},{}\n", format_param_value(value)));
            }
        } else {
            for spec in &schema.specs {
                let value = window.best_params.get(&spec.name).unwrap_or(&spec.default);
                out.push_str(&format!("{},{}\n", spec.name, format_param_value(value)));
            }
        }
        out.push('\n');

        out.push_str("Performance Metrics,\n");
        out.push_str(&format!("IS Net Profit %,{:.2}%\n", window.is_metrics.net_profit_pct));
        out.push_str(&format!("IS Max DD %,{:.2}%\n", window.is_metrics.max_drawdown_pct));
        out.push_str(&format!("IS Trades,{}\n", window.is_metrics.total_trades));
        out.push_str(&format!("OOS Net Profit %,{:.2}%\n", window.oos_metrics.net_profit_pct));
        out.push_str(&format!("OOS Max DD %,{:.2}%\n", window.oos_metrics.max_drawdown_pct));
        out.push_str(&format!("OOS Trades,{}\n", window.oos_metrics.total_trades));
        out.push_str("\n\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qre_core::BasicMetrics;
    use qre_wfa::{AdaptiveTelemetry, BestParamsSource, SelectionChain, WfaStitchedResult, WfaWindow};

    fn sample_window() -> WfaWindow {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        WfaWindow {
            window_number: 1,
            is_start: ts,
            is_end: ts,
            oos_start: ts,
            oos_end_nominal: ts,
            oos_end_actual: ts,
            best_params: Default::default(),
            param_id: "abc12345".into(),
            selection_chain: SelectionChain::default(),
            best_params_source: BestParamsSource::Optuna,
            is_metrics: BasicMetrics { net_profit_pct: 12.5, max_drawdown_pct: 3.0, total_trades: 10, ..Default::default() },
            oos_metrics: BasicMetrics { net_profit_pct: 4.2, max_drawdown_pct: 2.1, total_trades: 5, ..Default::default() },
            oos_equity_dense: vec![],
            oos_equity_compact: vec![],
            adaptive: AdaptiveTelemetry::default(),
        }
    }

    #[test]
    fn emits_summary_and_per_window_sections() {
        let config = WfaConfig::default();
        let result = WfaResult { windows: vec![sample_window()], stitched: WfaStitchedResult { stitched_net_profit_pct: 9.0, ..Default::default() } };
        let schema = ParamSchema::default();

        let csv = write_wfa_csv("s01_trailing_ma", &config, &result, &schema);

        assert!(csv.contains("=== STITCHED OOS PERFORMANCE ==="));
        assert!(csv.contains("Final OOS Net Profit %,9.00%"));
        assert!(csv.contains("--- Window #1: abc12345 ---"));
        assert!(csv.contains("IS Net Profit %,12.50%"));
    }
}
