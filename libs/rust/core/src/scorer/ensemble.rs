use tracing::{info, instrument, warn};

use super::{ensure_samples, DetectionResult, Method, MethodOutcome, Scorer};
use crate::forest::{FeatureVector, FittedModel, OutlierModel};
use crate::record::Dataset;
use crate::stats::{self, Welford};

/// Unsupervised ensemble voice. Trains `M` on the standardized feature matrix
/// and flags the `contamination` fraction with the highest outlier scores.
#[derive(Debug, Clone)]
pub struct EnsembleScorer<M> {
    model: M,
    contamination: f64,
    min_samples: usize,
    include_weekday: bool,
}

impl<M: OutlierModel> EnsembleScorer<M> {
    pub fn new(model: M, contamination: f64, min_samples: usize, include_weekday: bool) -> Self {
        Self { model, contamination, min_samples, include_weekday }
    }
}

/// Amount (and optionally day-of-week), each column scaled to zero mean and
/// unit population variance. Constant columns become all zeros.
pub fn feature_matrix(dataset: &Dataset, include_weekday: bool) -> Vec<FeatureVector> {
    let mut rows: Vec<FeatureVector> = dataset
        .records()
        .iter()
        .map(|r| if include_weekday { vec![r.amount(), f64::from(r.weekday())] } else { vec![r.amount()] })
        .collect();
    let dims = rows.first().map_or(0, Vec::len);
    for d in 0..dims {
        let w: Welford = rows.iter().map(|r| r[d]).collect();
        let n = w.count() as f64;
        let pop_std = (w.variance() * (n - 1.0) / n).sqrt();
        for r in rows.iter_mut() {
            r[d] = if pop_std > 0.0 { (r[d] - w.mean()) / pop_std } else { 0.0 };
        }
    }
    rows
}

/// Score above which a record is in the top `contamination` fraction.
pub fn decision_threshold(scores: &[f64], contamination: f64) -> f64 {
    stats::percentile(&stats::sorted(scores), 100.0 * (1.0 - contamination))
}

impl<M: OutlierModel> Scorer for EnsembleScorer<M> {
    fn method(&self) -> Method { Method::IsolationForest }

    #[instrument(name = "isolation_forest", skip_all, fields(records = dataset.len(), model = self.model.name()))]
    fn score(&self, dataset: &Dataset) -> MethodOutcome {
        if let Err(reason) = ensure_samples(dataset.len(), self.min_samples) {
            warn!(%reason, "ensemble abstained");
            return Err(reason);
        }
        let features = feature_matrix(dataset, self.include_weekday);
        let fitted = self.model.fit(&features).inspect_err(|reason| warn!(%reason, "ensemble abstained"))?;
        let scores = fitted.score(&features);
        let threshold = decision_threshold(&scores, self.contamination);
        let results: Vec<_> = scores
            .iter()
            .map(|&s| DetectionResult { method: Method::IsolationForest, is_anomalous: s > threshold, score: s, normalized: s })
            .collect();
        info!(flagged = results.iter().filter(|d| d.is_anomalous).count(), threshold, "isolation forest complete");
        Ok(results)
    }
}
