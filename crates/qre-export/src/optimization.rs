use qre_core::{OhlcvTable, ParamPayload, ParamSchema, ParamType, QreError, QreResult};
use qre_optimizer::TrialRecord;
use qre_strategy::{BalanceMixer, StrategyParams};

/// Optional metadata block written ahead of the results table when the
/// trials came from an Optuna-style sampler run (vs. a plain grid sweep).
pub struct OptunaMetadata {
    pub method: String,
    pub target: String,
    pub total_trials: usize,
    pub completed_trials: usize,
    pub pruned_trials: usize,
    pub best_trial_number: usize,
    pub best_value: f64,
    pub optimization_time: Option<String>,
}

fn format_fixed_param_value(param_type: ParamType, value: &qre_core::ParamValue) -> String {
    match param_type {
        ParamType::Float => value.as_f64().map(|n| format!("{n:.1}")).unwrap_or_default(),
        _ => match value {
            qre_core::ParamValue::Number(n) => {
                if *n == n.trunc() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            qre_core::ParamValue::Bool(b) => b.to_string(),
            qre_core::ParamValue::String(s) => s.clone(),
        },
    }
}

fn format_param_column(param_type: ParamType, value: &qre_core::ParamValue) -> String {
    match param_type {
        ParamType::Float => value.as_f64().map(|n| format!("{n:.1}")).unwrap_or_default(),
        _ => format_fixed_param_value(param_type, value),
    }
}

fn metric_columns() -> [(&'static str, &'static str); 10] {
    [
        ("Net Profit%", "net_profit_pct"),
        ("Max DD%", "max_drawdown_pct"),
        ("Trades", "total_trades"),
        ("Score", "score"),
        ("RoMaD", "romad"),
        ("Sharpe", "sharpe_ratio"),
        ("PF", "profit_factor"),
        ("Ulcer", "ulcer_index"),
        ("SQN", "sqn"),
        ("Consist", "consistency_score"),
    ]
}

fn format_metric_value(name: &str, result: &qre_core::StrategyResult, composite_score: Option<f64>) -> String {
    match name {
        "net_profit_pct" => format!("{:.2}%", result.basic.net_profit_pct),
        "max_drawdown_pct" => format!("{:.2}%", result.basic.max_drawdown_pct),
        "total_trades" => result.basic.total_trades.to_string(),
        "score" => composite_score.map(|s| format!("{s:.2}")).unwrap_or_default(),
        "romad" => result.advanced.romad.map(|v| format!("{v:.2}")).unwrap_or_default(),
        "sharpe_ratio" => result.advanced.sharpe_ratio.map(|v| format!("{v:.2}")).unwrap_or_default(),
        "profit_factor" => result.advanced.profit_factor.map(|v| format!("{v:.2}")).unwrap_or_default(),
        "ulcer_index" => result.advanced.ulcer_index.map(|v| format!("{v:.2}")).unwrap_or_default(),
        "sqn" => result.advanced.sqn.map(|v| format!("{v:.2}")).unwrap_or_default(),
        "consistency_score" => result.advanced.consistency_score.map(|v| format!("{v:.2}")).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Three sections: optional Optuna metadata, fixed parameters, then one row
/// per trial with varied params + metrics. Metrics are not stored on
/// [`TrialRecord`], so each row replays the strategy against `table` with
/// that trial's parameters to recover them.
#[allow(clippy::too_many_arguments)]
pub fn write_optimization_csv(
    table: &OhlcvTable,
    schema: &ParamSchema,
    trade_start_idx: usize,
    trials: &[TrialRecord],
    fixed_params: &ParamPayload,
    metadata: Option<&OptunaMetadata>,
    filter_min_profit: bool,
    min_profit_threshold: f64,
) -> QreResult<String> {
    use std::fmt::Write as _;

    let mut out = String::new();

    if let Some(meta) = metadata {
        out.push_str("Optuna Metadata\n");
        let _ = writeln!(out, "Method,{}", meta.method);
        if meta.method == "Optuna" {
            let _ = writeln!(out, "Target,{}", meta.target);
            let _ = writeln!(out, "Total Trials,{}", meta.total_trials);
            let _ = writeln!(out, "Completed Trials,{}", meta.completed_trials);
            let _ = writeln!(out, "Pruned Trials,{}", meta.pruned_trials);
            let _ = writeln!(out, "Best Trial Number,{}", meta.best_trial_number);
            let _ = writeln!(out, "Best Value,{}", meta.best_value);
            let _ = writeln!(out, "Optimization Time,{}", meta.optimization_time.as_deref().unwrap_or("-"));
        } else {
            let _ = writeln!(out, "Optimization Time,{}", meta.optimization_time.as_deref().unwrap_or("-"));
        }
        out.push('\n');
    }

    out.push_str("Fixed Parameters\n");
    out.push_str("Parameter Name,Value\n");
    for (name, value) in fixed_params {
        let param_type = schema.get(name).map(|s| s.param_type).unwrap_or(ParamType::Float);
        let _ = writeln!(out, "{name},{}", format_fixed_param_value(param_type, value));
    }
    out.push('\n');

    let varied_specs: Vec<_> = schema.specs.iter().filter(|s| !fixed_params.contains_key(&s.name)).collect();
    let metrics = metric_columns();

    let header: Vec<&str> = varied_specs.iter().map(|s| s.name.as_str()).chain(metrics.iter().map(|(label, _)| *label)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for trial in trials {
        let params = StrategyParams::from_payload(&trial.params, schema)?;
        let result = qre_strategy::run(table, &params, trade_start_idx, BalanceMixer::default())?;

        if filter_min_profit && result.basic.net_profit_pct < min_profit_threshold {
            continue;
        }

        let mut row: Vec<String> = Vec::with_capacity(header.len());
        for spec in &varied_specs {
            let value = trial.params.get(&spec.name).unwrap_or(&spec.default);
            row.push(format_param_column(spec.param_type, value));
        }
        for (_, key) in metrics {
            row.push(format_metric_value(key, &result, trial.composite_score));
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use qre_core::{Bar, ParamValue};

    fn synthetic_table(n: usize) -> OhlcvTable {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
                Bar { timestamp: start + Duration::hours(i as i64), open: price, high: price + 1.0, low: price - 1.0, close: price, volume: 10.0 }
            })
            .collect();
        OhlcvTable::from_bars(bars)
    }

    fn shrunk_payload() -> ParamPayload {
        let mut p = ParamPayload::new();
        p.insert("maLength".into(), ParamValue::Number(5.0));
        p.insert("trailLongLength".into(), ParamValue::Number(5.0));
        p.insert("trailShortLength".into(), ParamValue::Number(5.0));
        p.insert("stopLongLP".into(), ParamValue::Number(2.0));
        p.insert("stopShortLP".into(), ParamValue::Number(2.0));
        p.insert("atrPeriod".into(), ParamValue::Number(5.0));
        p
    }

    #[test]
    fn builds_fixed_and_varied_columns_replaying_each_trial() {
        let schema = qre_strategy::schema();
        let table = synthetic_table(80);
        let trial = TrialRecord {
            trial_number: 0,
            params: shrunk_payload(),
            objective_values: vec![1.0],
            constraints_satisfied: true,
            constraint_values: vec![],
            composite_score: Some(0.5),
            is_pareto_optimal: true,
            dominance_rank: 0,
            pruned: false,
        };

        let mut fixed = ParamPayload::new();
        fixed.insert("dateFilter".into(), ParamValue::Bool(false));

        let csv = write_optimization_csv(&table, &schema, 10, &[trial], &fixed, None, false, 0.0).unwrap();

        assert!(csv.contains("Fixed Parameters"));
        assert!(csv.contains("dateFilter,false"));
        let header_line = csv.lines().find(|l| l.starts_with("maType,")).expect("header row present");
        assert!(header_line.contains("Net Profit%"));
        assert!(!header_line.contains("dateFilter"));
    }
}
