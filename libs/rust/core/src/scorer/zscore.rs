use tracing::{info, instrument, warn};

use super::{ensure_samples, DetectionResult, Method, MethodOutcome, Scorer};
use crate::error::Abstention;
use crate::record::Dataset;
use crate::stats::{Welford, SPREAD_EPSILON};

/// Global z-score test over every amount in the dataset.
#[derive(Debug, Clone)]
pub struct ZScoreScorer {
    threshold: f64,
    min_samples: usize,
}

impl ZScoreScorer {
    pub fn new(threshold: f64, min_samples: usize) -> Self { Self { threshold, min_samples } }
}

impl Scorer for ZScoreScorer {
    fn method(&self) -> Method { Method::ZScore }

    #[instrument(name = "zscore_detection", skip_all, fields(records = dataset.len()))]
    fn score(&self, dataset: &Dataset) -> MethodOutcome {
        let out = zscore_test(&dataset.amounts(), self.threshold, self.min_samples, Method::ZScore);
        match &out {
            Ok(r) => info!(flagged = r.iter().filter(|d| d.is_anomalous).count(), "z-score complete"),
            Err(reason) => warn!(%reason, "z-score abstained"),
        }
        out
    }
}

/// Mean and sample standard deviation of `values`, then `|z| > threshold`.
/// Shared with the per-category scorer, which tags results with its own method.
pub(crate) fn zscore_test(values: &[f64], threshold: f64, min_samples: usize, method: Method) -> MethodOutcome {
    ensure_samples(values.len(), min_samples)?;
    let w: Welford = values.iter().copied().collect();
    let std = w.std_dev();
    if !std.is_finite() {
        return Err(Abstention::NonFiniteSpread { method: method.name() });
    }
    if std <= SPREAD_EPSILON {
        return Err(Abstention::DegenerateDistribution { method: method.name() });
    }
    Ok(values
        .iter()
        .map(|&x| {
            let z = (x - w.mean()) / std;
            DetectionResult { method, is_anomalous: z.abs() > threshold, score: z, normalized: normalize(z.abs(), threshold) }
        })
        .collect())
}

/// Maps |z| from [threshold, 3 * threshold] onto [0, 1].
fn normalize(abs_z: f64, threshold: f64) -> f64 {
    if abs_z <= threshold { return 0.0; }
    ((abs_z - threshold) / (2.0 * threshold)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_single_spike() {
        let mut values = vec![50.0; 50];
        values[25] = 200.0;
        let r = zscore_test(&values, 3.0, 7, Method::ZScore).unwrap();
        let flagged: Vec<_> = r.iter().enumerate().filter(|(_, d)| d.is_anomalous).map(|(i, _)| i).collect();
        assert_eq!(flagged, vec![25]);
        assert!(r[25].score > 3.0);
        assert!(r[25].normalized > 0.0 && r[25].normalized <= 1.0);
        assert_eq!(r[0].normalized, 0.0);
    }

    #[test]
    fn identical_values_abstain() {
        let r = zscore_test(&[5.0; 20], 3.0, 7, Method::ZScore);
        assert_eq!(r, Err(Abstention::DegenerateDistribution { method: "zscore" }));
    }

    #[test]
    fn overflowing_spread_is_not_called_degenerate() {
        let values: Vec<f64> = (0..30).map(|i| 1e307 + f64::from(i) * 1e305).collect();
        let r = zscore_test(&values, 3.0, 7, Method::ZScore);
        assert_eq!(r, Err(Abstention::NonFiniteSpread { method: "zscore" }));
    }

    #[test]
    fn too_few_values_abstain() {
        let r = zscore_test(&[1.0, 2.0, 3.0], 3.0, 7, Method::ZScore);
        assert_eq!(r, Err(Abstention::InsufficientData { required: 7, actual: 3 }));
    }

    #[test]
    fn normalize_saturates() {
        assert_eq!(normalize(2.0, 3.0), 0.0);
        assert!((normalize(6.0, 3.0) - 0.5).abs() < 1e-12);
        assert_eq!(normalize(30.0, 3.0), 1.0);
    }
}
