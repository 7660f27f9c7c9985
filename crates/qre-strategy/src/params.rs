use chrono::{DateTime, Utc};
use qre_core::{ParamPayload, ParamSchema, ParamSpec, ParamType, ParamValue, QreError, QreResult};
use qre_indicators::MaType;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ATR_PERIOD: i64 = 14;

fn ma_type_from_str(s: &str) -> QreResult<MaType> {
    match s.to_uppercase().as_str() {
        "SMA" => Ok(MaType::Sma),
        "EMA" => Ok(MaType::Ema),
        "WMA" => Ok(MaType::Wma),
        "HMA" => Ok(MaType::Hma),
        "VWMA" => Ok(MaType::Vwma),
        "VWAP" => Ok(MaType::Vwap),
        "ALMA" => Ok(MaType::Alma),
        "DEMA" => Ok(MaType::Dema),
        "KAMA" => Ok(MaType::Kama),
        "TMA" => Ok(MaType::Tma),
        "T3" => Ok(MaType::T3),
        other => Err(QreError::InputValidation(format!("unsupported MA type: {other}"))),
    }
}

/// Resolved parameters for the trailing-MA trend strategy (S01). Field
/// names follow the original camelCase payload keys in `param_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    pub use_date_filter: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,

    pub ma_type: MaType,
    pub ma_length: usize,
    pub close_count_long: i64,
    pub close_count_short: i64,

    pub stop_long_atr: f64,
    pub stop_long_rr: f64,
    pub stop_long_lp: usize,
    pub stop_short_atr: f64,
    pub stop_short_rr: f64,
    pub stop_short_lp: usize,
    pub stop_long_max_pct: f64,
    pub stop_short_max_pct: f64,
    pub stop_long_max_days: i64,
    pub stop_short_max_days: i64,

    pub trail_rr_long: f64,
    pub trail_rr_short: f64,
    pub trail_ma_long_type: MaType,
    pub trail_ma_long_length: usize,
    pub trail_ma_long_offset_pct: f64,
    pub trail_ma_short_type: MaType,
    pub trail_ma_short_length: usize,
    pub trail_ma_short_offset_pct: f64,

    pub risk_per_trade_pct: f64,
    pub contract_size: f64,
    pub commission_rate: f64,
    pub atr_period: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            use_date_filter: true,
            start: None,
            end: None,
            ma_type: MaType::Ema,
            ma_length: 45,
            close_count_long: 7,
            close_count_short: 5,
            stop_long_atr: 2.0,
            stop_long_rr: 3.0,
            stop_long_lp: 2,
            stop_short_atr: 2.0,
            stop_short_rr: 3.0,
            stop_short_lp: 2,
            stop_long_max_pct: 3.0,
            stop_short_max_pct: 3.0,
            stop_long_max_days: 2,
            stop_short_max_days: 4,
            trail_rr_long: 1.0,
            trail_rr_short: 1.0,
            trail_ma_long_type: MaType::Sma,
            trail_ma_long_length: 160,
            trail_ma_long_offset_pct: -1.0,
            trail_ma_short_type: MaType::Sma,
            trail_ma_short_length: 160,
            trail_ma_short_offset_pct: 1.0,
            risk_per_trade_pct: 2.0,
            contract_size: 0.01,
            commission_rate: 0.0005,
            atr_period: DEFAULT_ATR_PERIOD as usize,
        }
    }
}

impl StrategyParams {
    /// The greatest of the three moving-average lengths this strategy
    /// references, used to size the default warmup window.
    pub fn longest_ma_length(&self) -> usize {
        self.ma_length.max(self.trail_ma_long_length).max(self.trail_ma_short_length)
    }

    /// Build parameters from a validated payload, keyed by the camelCase
    /// names a caller (CLI/HTTP/optimizer) would submit.
    pub fn from_payload(payload: &ParamPayload, schema: &ParamSchema) -> QreResult<Self> {
        let resolved = schema.validate(payload)?;
        let mut p = StrategyParams::default();

        let get_f64 = |name: &str, default: f64| -> f64 {
            resolved.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
        };
        let get_usize = |name: &str, default: usize| -> usize {
            resolved.get(name).and_then(ParamValue::as_f64).map(|v| v.max(0.0) as usize).unwrap_or(default)
        };
        let get_i64 = |name: &str, default: i64| -> i64 {
            resolved.get(name).and_then(ParamValue::as_f64).map(|v| v as i64).unwrap_or(default)
        };
        let get_bool = |name: &str, default: bool| -> bool {
            resolved.get(name).and_then(ParamValue::as_bool).unwrap_or(default)
        };

        p.use_date_filter = get_bool("dateFilter", p.use_date_filter);
        p.start = resolved.get("start").and_then(ParamValue::as_timestamp);
        p.end = resolved.get("end").and_then(ParamValue::as_timestamp);

        if let Some(v) = resolved.get("maType").and_then(ParamValue::as_str) {
            p.ma_type = ma_type_from_str(v)?;
        }
        p.ma_length = get_usize("maLength", p.ma_length);
        p.close_count_long = get_i64("closeCountLong", p.close_count_long).max(0);
        p.close_count_short = get_i64("closeCountShort", p.close_count_short).max(0);

        p.stop_long_atr = get_f64("stopLongX", p.stop_long_atr);
        p.stop_long_rr = get_f64("stopLongRR", p.stop_long_rr);
        p.stop_long_lp = get_usize("stopLongLP", p.stop_long_lp).max(1);
        p.stop_short_atr = get_f64("stopShortX", p.stop_short_atr);
        p.stop_short_rr = get_f64("stopShortRR", p.stop_short_rr);
        p.stop_short_lp = get_usize("stopShortLP", p.stop_short_lp).max(1);
        p.stop_long_max_pct = get_f64("stopLongMaxPct", p.stop_long_max_pct).max(0.0);
        p.stop_short_max_pct = get_f64("stopShortMaxPct", p.stop_short_max_pct).max(0.0);
        p.stop_long_max_days = get_i64("stopLongMaxDays", p.stop_long_max_days).max(0);
        p.stop_short_max_days = get_i64("stopShortMaxDays", p.stop_short_max_days).max(0);

        p.trail_rr_long = get_f64("trailRRLong", p.trail_rr_long).max(0.0);
        p.trail_rr_short = get_f64("trailRRShort", p.trail_rr_short).max(0.0);
        if let Some(v) = resolved.get("trailLongType").and_then(ParamValue::as_str) {
            p.trail_ma_long_type = ma_type_from_str(v)?;
        }
        p.trail_ma_long_length = get_usize("trailLongLength", p.trail_ma_long_length);
        p.trail_ma_long_offset_pct = get_f64("trailLongOffset", p.trail_ma_long_offset_pct);
        if let Some(v) = resolved.get("trailShortType").and_then(ParamValue::as_str) {
            p.trail_ma_short_type = ma_type_from_str(v)?;
        }
        p.trail_ma_short_length = get_usize("trailShortLength", p.trail_ma_short_length);
        p.trail_ma_short_offset_pct = get_f64("trailShortOffset", p.trail_ma_short_offset_pct);

        p.risk_per_trade_pct = get_f64("riskPerTrade", p.risk_per_trade_pct).max(0.0);
        p.contract_size = get_f64("contractSize", p.contract_size).max(0.0);
        p.commission_rate = get_f64("commissionRate", p.commission_rate).max(0.0);
        p.atr_period = get_usize("atrPeriod", p.atr_period).max(1);

        Ok(p)
    }
}

/// Published parameter schema for the trailing-MA strategy: every numeric
/// field is optimizable by default with a permissive range, matching the
/// optimizer's ability to search any declared field unless narrowed by the
/// caller's search-space override.
pub fn schema() -> ParamSchema {
    let d = StrategyParams::default();
    let numeric = |name: &str, default: f64, min: f64, max: f64| ParamSpec {
        name: name.to_string(),
        param_type: ParamType::Float,
        default: ParamValue::Number(default),
        options: None,
        optimize: qre_core::OptimizeSpec {
            enabled: true,
            min: Some(min),
            max: Some(max),
            step: None,
            options: None,
        },
    };

    ParamSchema {
        specs: vec![
            ParamSpec {
                name: "dateFilter".into(),
                param_type: ParamType::Bool,
                default: ParamValue::Bool(d.use_date_filter),
                options: None,
                optimize: Default::default(),
            },
            ParamSpec {
                name: "maType".into(),
                param_type: ParamType::Categorical,
                default: ParamValue::String("EMA".into()),
                options: Some(
                    ["SMA", "EMA", "WMA", "HMA", "VWMA", "VWAP", "ALMA", "DEMA", "KAMA", "TMA", "T3"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                optimize: Default::default(),
            },
            numeric("maLength", d.ma_length as f64, 5.0, 400.0),
            numeric("closeCountLong", d.close_count_long as f64, 1.0, 20.0),
            numeric("closeCountShort", d.close_count_short as f64, 1.0, 20.0),
            numeric("stopLongX", d.stop_long_atr, 0.5, 6.0),
            numeric("stopLongRR", d.stop_long_rr, 0.5, 8.0),
            numeric("stopLongLP", d.stop_long_lp as f64, 1.0, 30.0),
            numeric("stopShortX", d.stop_short_atr, 0.5, 6.0),
            numeric("stopShortRR", d.stop_short_rr, 0.5, 8.0),
            numeric("stopShortLP", d.stop_short_lp as f64, 1.0, 30.0),
            numeric("stopLongMaxPct", d.stop_long_max_pct, 0.1, 20.0),
            numeric("stopShortMaxPct", d.stop_short_max_pct, 0.1, 20.0),
            numeric("stopLongMaxDays", d.stop_long_max_days as f64, 0.0, 60.0),
            numeric("stopShortMaxDays", d.stop_short_max_days as f64, 0.0, 60.0),
            numeric("trailRRLong", d.trail_rr_long, 0.0, 5.0),
            numeric("trailRRShort", d.trail_rr_short, 0.0, 5.0),
            numeric("trailLongLength", d.trail_ma_long_length as f64, 5.0, 400.0),
            numeric("trailLongOffset", d.trail_ma_long_offset_pct, -10.0, 10.0),
            numeric("trailShortLength", d.trail_ma_short_length as f64, 5.0, 400.0),
            numeric("trailShortOffset", d.trail_ma_short_offset_pct, -10.0, 10.0),
            numeric("riskPerTrade", d.risk_per_trade_pct, 0.1, 10.0),
            numeric("contractSize", d.contract_size, 0.0001, 10.0),
            numeric("commissionRate", d.commission_rate, 0.0, 0.01),
            numeric("atrPeriod", d.atr_period as f64, 2.0, 60.0),
        ],
    }
}
