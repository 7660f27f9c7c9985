use qre_core::Bar;
use serde::{Deserialize, Serialize};

/// Return `val` if finite, else `default`. Warmup windows and divide-by-zero
/// edge cases fall back to this rather than propagating NaN downstream.
#[inline]
fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

const FACTOR_T3: f64 = 0.7;
const FAST_KAMA: usize = 2;
const SLOW_KAMA: usize = 30;

/// The eleven moving-average families a strategy can select for its trend
/// reference or trailing-stop reference line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaType {
    Sma,
    Ema,
    Wma,
    Hma,
    Vwma,
    Vwap,
    Alma,
    Dema,
    Kama,
    Tma,
    T3,
}

/// Compute `ma_type` over `close`, using `bars` for the volume-weighted
/// variants. Output is the same length as `close`; positions before the
/// warmup window are `NaN`, mirroring how the original pandas-based engine
/// aligns moving averages to the source index.
pub fn get_ma(close: &[f64], bars: &[Bar], ma_type: MaType, length: usize) -> Vec<f64> {
    match ma_type {
        MaType::Sma => sma(close, length),
        MaType::Ema => ema(close, length),
        MaType::Wma => wma(close, length),
        MaType::Hma => hma(close, length),
        MaType::Vwma => vwma(close, bars, length),
        MaType::Vwap => vwap(bars),
        MaType::Alma => alma(close, length, 6.0, 0.85),
        MaType::Dema => dema(close, length),
        MaType::Kama => kama(close, length),
        MaType::Tma => tma(close, length),
        MaType::T3 => t3(close, length),
    }
}

fn nan_vec(len: usize) -> Vec<f64> {
    vec![f64::NAN; len]
}

/// Simple moving average, aligned to `data`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let mut out = nan_vec(data.len());
    let mut sum: f64 = data[..period].iter().sum();
    out[period - 1] = finite_or(sum / period as f64, f64::NAN);
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        out[i] = finite_or(sum / period as f64, f64::NAN);
    }
    out
}

/// Exponential moving average, seeded with an SMA over the first `period`
/// values and smoothed thereafter.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let mut out = nan_vec(data.len());
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);
    out[period - 1] = seed;
    for i in period..data.len() {
        let prev = out[i - 1];
        out[i] = finite_or((data[i] - prev) * multiplier + prev, prev);
    }
    out
}

/// Linearly weighted moving average: most recent bar weighted `period`,
/// oldest weighted 1.
pub fn wma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let denom = (period * (period + 1) / 2) as f64;
    let mut out = nan_vec(data.len());
    for i in period - 1..data.len() {
        let mut weighted = 0.0;
        for (w, v) in (1..=period).zip(data[i + 1 - period..=i].iter()) {
            weighted += w as f64 * v;
        }
        out[i] = finite_or(weighted / denom, f64::NAN);
    }
    out
}

/// Hull moving average: `WMA(2*WMA(n/2) - WMA(n), sqrt(n))`, reduces lag
/// relative to a plain WMA of the same length.
pub fn hma(data: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return nan_vec(data.len());
    }
    let half = (period / 2).max(1);
    let sqrt_period = (period as f64).sqrt().round().max(1.0) as usize;

    let wma_half = wma(data, half);
    let wma_full = wma(data, period);

    let mut raw = nan_vec(data.len());
    for i in 0..data.len() {
        if wma_half[i].is_finite() && wma_full[i].is_finite() {
            raw[i] = 2.0 * wma_half[i] - wma_full[i];
        }
    }

    wma(&raw, sqrt_period)
}

/// Volume-weighted moving average over a rolling window.
pub fn vwma(close: &[f64], bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || close.len() < period || close.len() != bars.len() {
        return nan_vec(close.len());
    }
    let mut out = nan_vec(close.len());
    for i in period - 1..close.len() {
        let window = &bars[i + 1 - period..=i];
        let vol_sum: f64 = window.iter().map(|b| b.volume).sum();
        let pv_sum: f64 = window
            .iter()
            .zip(close[i + 1 - period..=i].iter())
            .map(|(b, c)| b.volume * c)
            .sum();
        out[i] = if vol_sum > 0.0 {
            finite_or(pv_sum / vol_sum, f64::NAN)
        } else {
            finite_or(close[i], f64::NAN)
        };
    }
    out
}

/// Cumulative volume-weighted average price from the start of the series
/// (no intraday session reset is modeled — the data feed is single-session
/// OHLCV bars, not multi-day intraday data).
pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    let mut out = nan_vec(bars.len());
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for (i, b) in bars.iter().enumerate() {
        let typical = (b.high + b.low + b.close) / 3.0;
        cum_pv += typical * b.volume;
        cum_vol += b.volume;
        out[i] = if cum_vol > 0.0 {
            finite_or(cum_pv / cum_vol, f64::NAN)
        } else {
            finite_or(typical, f64::NAN)
        };
    }
    out
}

/// Arnaud Legoux moving average: a Gaussian-weighted window shifted toward
/// the most recent bars by `offset` (0..1), with `sigma` controlling width.
pub fn alma(data: &[f64], period: usize, sigma: f64, offset: f64) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let m = offset * (period as f64 - 1.0);
    let s = period as f64 / sigma;
    let mut weights = Vec::with_capacity(period);
    let mut weight_sum = 0.0;
    for j in 0..period {
        let w = (-((j as f64 - m).powi(2)) / (2.0 * s * s)).exp();
        weights.push(w);
        weight_sum += w;
    }

    let mut out = nan_vec(data.len());
    for i in period - 1..data.len() {
        let window = &data[i + 1 - period..=i];
        let weighted: f64 = window.iter().zip(weights.iter()).map(|(v, w)| v * w).sum();
        out[i] = finite_or(weighted / weight_sum, f64::NAN);
    }
    out
}

/// Double exponential moving average: `2*EMA - EMA(EMA)`.
pub fn dema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let ema1 = ema(data, period);
    let ema2 = ema(&ema1, period);
    let mut out = nan_vec(data.len());
    for i in 0..data.len() {
        if ema1[i].is_finite() && ema2[i].is_finite() {
            out[i] = 2.0 * ema1[i] - ema2[i];
        }
    }
    out
}

/// Kaufman adaptive moving average: smoothing constant scales with the
/// efficiency ratio between `FAST_KAMA` and `SLOW_KAMA` bounds.
pub fn kama(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() <= period {
        return nan_vec(data.len());
    }
    let fast_sc = 2.0 / (FAST_KAMA as f64 + 1.0);
    let slow_sc = 2.0 / (SLOW_KAMA as f64 + 1.0);

    let mut out = nan_vec(data.len());
    out[period] = data[period];

    for i in period + 1..data.len() {
        let change = (data[i] - data[i - period]).abs();
        let volatility: f64 = (i - period + 1..=i)
            .map(|j| (data[j] - data[j - 1]).abs())
            .sum();
        let er = if volatility > 0.0 { change / volatility } else { 0.0 };
        let sc = (er * (fast_sc - slow_sc) + slow_sc).powi(2);
        let prev = if out[i - 1].is_finite() { out[i - 1] } else { data[i - 1] };
        out[i] = finite_or(prev + sc * (data[i] - prev), prev);
    }
    out
}

/// Triangular moving average: an SMA of an SMA, double-smoothing the line.
pub fn tma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let first = sma(data, period);
    let second_period = (period + 1) / 2;
    let mut second = nan_vec(data.len());
    let finite: Vec<f64> = first.iter().copied().filter(|v| v.is_finite()).collect();
    let inner = sma(&finite, second_period.max(1));
    let offset = data.len() - inner.len();
    for (i, v) in inner.into_iter().enumerate() {
        second[offset + i] = v;
    }
    second
}

/// Tillson T3: a sixfold-EMA cascade blended by `FACTOR_T3`, giving a
/// smoother line with less lag than a plain EMA of the same length.
pub fn t3(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return nan_vec(data.len());
    }
    let e1 = ema(data, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    let e4 = ema(&e3, period);
    let e5 = ema(&e4, period);
    let e6 = ema(&e5, period);

    let c1 = -(FACTOR_T3.powi(3));
    let c2 = 3.0 * FACTOR_T3.powi(2) + 3.0 * FACTOR_T3.powi(3);
    let c3 = -6.0 * FACTOR_T3.powi(2) - 3.0 * FACTOR_T3 - 3.0 * FACTOR_T3.powi(3);
    let c4 = 1.0 + 3.0 * FACTOR_T3 + FACTOR_T3.powi(3) + 3.0 * FACTOR_T3.powi(2);

    let mut out = nan_vec(data.len());
    for i in 0..data.len() {
        if [e1[i], e2[i], e3[i], e4[i], e5[i], e6[i]].iter().all(|v| v.is_finite()) {
            out[i] = finite_or(c1 * e6[i] + c2 * e5[i] + c3 * e4[i] + c4 * e3[i], f64::NAN);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars_from_close(close: &[f64]) -> Vec<Bar> {
        close
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: chrono::DateTime::<chrono::Utc>::from_timestamp(i as i64 * 60, 0).unwrap(),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn sma_matches_hand_computation() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&data, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn ema_seeds_with_sma() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&data, 3);
        assert_eq!(out[2], 2.0);
        assert!(out[3] > out[2]);
    }

    #[test]
    fn hma_reduces_lag_relative_to_wma() {
        let data: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let wma_out = wma(&data, 10);
        let hma_out = hma(&data, 10);
        let last = data.len() - 1;
        assert!(hma_out[last].is_finite());
        assert!(wma_out[last].is_finite());
    }

    #[test]
    fn vwap_is_cumulative() {
        let bars = bars_from_close(&[10.0, 11.0, 12.0]);
        let out = vwap(&bars);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn get_ma_dispatches_by_type() {
        let close = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let bars = bars_from_close(&close);
        let sma_out = get_ma(&close, &bars, MaType::Sma, 3);
        assert_eq!(sma_out[5], sma(&close, 3)[5]);
    }
}
