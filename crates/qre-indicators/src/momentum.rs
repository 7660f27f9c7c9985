use crate::ma::sma;

#[inline]
fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Relative Strength Index, Wilder-smoothed, aligned to `data`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![f64::NAN; data.len()];
    }

    let mut gains = vec![0.0; data.len()];
    let mut losses = vec![0.0; data.len()];
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = change.abs();
        }
    }

    let mut out = vec![f64::NAN; data.len()];
    let mut avg_gain = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in period + 1..data.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
    finite_or(100.0 - (100.0 / (1.0 + rs)), 50.0)
}

/// Stochastic RSI: applies the %K/%D stochastic formula to the RSI series
/// rather than to price, then smooths %K into %D with `d_period`.
pub struct StochRsiResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stoch_rsi(data: &[f64], rsi_period: usize, stoch_period: usize, d_period: usize) -> StochRsiResult {
    let rsi_values = rsi(data, rsi_period);
    let len = data.len();
    let mut k = vec![f64::NAN; len];

    if stoch_period == 0 {
        return StochRsiResult { k: k.clone(), d: k };
    }

    for i in 0..len {
        if i + 1 < stoch_period {
            continue;
        }
        let window = &rsi_values[i + 1 - stoch_period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let highest = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().copied().fold(f64::INFINITY, f64::min);
        k[i] = if highest > lowest {
            finite_or(100.0 * (rsi_values[i] - lowest) / (highest - lowest), 50.0)
        } else {
            50.0
        };
    }

    let finite_k: Vec<f64> = k.iter().copied().filter(|v| v.is_finite()).collect();
    let smoothed = sma(&finite_k, d_period.max(1));
    let mut d = vec![f64::NAN; len];
    let offset = len - smoothed.len();
    for (i, v) in smoothed.into_iter().enumerate() {
        d[offset + i] = v;
    }

    StochRsiResult { k, d }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_is_bounded() {
        let data: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
        let out = rsi(&data, 14);
        for v in out.iter().filter(|v| v.is_finite()) {
            assert!(*v >= 0.0 && *v <= 100.0);
        }
    }

    #[test]
    fn stoch_rsi_is_bounded() {
        let data: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.21).cos() * 3.0).collect();
        let res = stoch_rsi(&data, 14, 14, 3);
        for v in res.k.iter().filter(|v| v.is_finite()) {
            assert!(*v >= 0.0 && *v <= 100.0);
        }
        for v in res.d.iter().filter(|v| v.is_finite()) {
            assert!(*v >= 0.0 && *v <= 100.0);
        }
    }
}
