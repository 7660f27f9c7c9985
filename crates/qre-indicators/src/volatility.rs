use qre_core::Bar;

#[inline]
fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Average True Range via Wilder-style EWM smoothing (`alpha = 1/period`),
/// aligned to `bars`. The first bar has no previous close, so true range
/// there degenerates to the bar's own high-low range.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.is_empty() {
        return vec![f64::NAN; bars.len()];
    }

    let mut true_range = Vec::with_capacity(bars.len());
    true_range.push(bars[0].high - bars[0].low);
    for i in 1..bars.len() {
        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let alpha = 1.0 / period as f64;
    let mut out = Vec::with_capacity(bars.len());
    let mut prev = true_range[0];
    out.push(finite_or(prev, 0.0));
    for tr in &true_range[1..] {
        prev = alpha * tr + (1.0 - alpha) * prev;
        out.push(finite_or(prev, 0.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn bar(ts: i64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            timestamp: DateTime::<Utc>::from_timestamp(ts, 0).unwrap(),
            open: c,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn atr_is_aligned_and_nonnegative() {
        let bars = vec![bar(0, 10.0, 8.0, 9.0), bar(60, 11.0, 9.0, 10.0), bar(120, 12.0, 9.5, 11.0)];
        let out = atr(&bars, 2);
        assert_eq!(out.len(), bars.len());
        assert!(out.iter().all(|v| *v >= 0.0));
    }
}
