/// Decides whether a trial should be abandoned early based on how its
/// intermediate value at `step` compares to other trials' values at the
/// same step. Values are oriented so that larger is always better.
pub trait Pruner: Send {
    fn should_prune(&mut self, step: usize, value: f64, completed_at_step: &[f64]) -> bool;
}

pub struct NoopPruner;

impl Pruner for NoopPruner {
    fn should_prune(&mut self, _step: usize, _value: f64, _completed_at_step: &[f64]) -> bool {
        false
    }
}

fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Prunes a trial whose value falls below the median of prior trials at the
/// same step, once at least `n_warmup_steps` steps have been observed.
pub struct MedianPruner {
    pub n_warmup_steps: usize,
}

impl Pruner for MedianPruner {
    fn should_prune(&mut self, step: usize, value: f64, completed_at_step: &[f64]) -> bool {
        if step < self.n_warmup_steps || completed_at_step.is_empty() {
            return false;
        }
        percentile(completed_at_step, 50.0).map(|median| value < median).unwrap_or(false)
    }
}

/// Generalization of `MedianPruner` to an arbitrary percentile threshold.
pub struct PercentilePruner {
    pub percentile: f64,
    pub n_warmup_steps: usize,
}

impl Pruner for PercentilePruner {
    fn should_prune(&mut self, step: usize, value: f64, completed_at_step: &[f64]) -> bool {
        if step < self.n_warmup_steps || completed_at_step.is_empty() {
            return false;
        }
        percentile(completed_at_step, self.percentile).map(|threshold| value < threshold).unwrap_or(false)
    }
}

/// Wraps another pruner but only acts once the inner pruner has recommended
/// pruning for `patience` consecutive steps, tolerating transient dips.
pub struct PatientPruner {
    inner: Box<dyn Pruner>,
    patience: usize,
    consecutive: usize,
}

impl PatientPruner {
    pub fn new(inner: Box<dyn Pruner>, patience: usize) -> Self {
        Self { inner, patience, consecutive: 0 }
    }
}

impl Pruner for PatientPruner {
    fn should_prune(&mut self, step: usize, value: f64, completed_at_step: &[f64]) -> bool {
        if self.inner.should_prune(step, value, completed_at_step) {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.consecutive > self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_pruner_respects_warmup() {
        let mut pruner = MedianPruner { n_warmup_steps: 2 };
        assert!(!pruner.should_prune(0, -100.0, &[1.0, 2.0, 3.0]));
        assert!(pruner.should_prune(2, -100.0, &[1.0, 2.0, 3.0]));
        assert!(!pruner.should_prune(2, 100.0, &[1.0, 2.0, 3.0]));
    }

    #[test]
    fn patient_pruner_requires_consecutive_failures() {
        let mut pruner = PatientPruner::new(Box::new(MedianPruner { n_warmup_steps: 0 }), 2);
        assert!(!pruner.should_prune(0, -1.0, &[1.0, 2.0, 3.0]));
        assert!(!pruner.should_prune(1, -1.0, &[1.0, 2.0, 3.0]));
        assert!(pruner.should_prune(2, -1.0, &[1.0, 2.0, 3.0]));
    }
}
