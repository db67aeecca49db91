use tracing::{debug, info, instrument, warn};

use super::zscore::zscore_test;
use super::{DetectionResult, Method, MethodOutcome, Scorer};
use crate::error::Abstention;
use crate::record::Dataset;

/// Z-score test re-run inside every category partition against that
/// partition's own mean and spread. Partitions below `min_samples` (or with
/// zero spread) are skipped: their records are never flagged by this method.
#[derive(Debug, Clone)]
pub struct ServiceLevelScorer {
    threshold: f64,
    min_samples: usize,
}

impl ServiceLevelScorer {
    pub fn new(threshold: f64, min_samples: usize) -> Self { Self { threshold, min_samples } }
}

impl Scorer for ServiceLevelScorer {
    fn method(&self) -> Method { Method::ServiceLevel }

    #[instrument(name = "service_level_detection", skip_all, fields(records = dataset.len()))]
    fn score(&self, dataset: &Dataset) -> MethodOutcome {
        let records = dataset.records();
        let mut results = vec![DetectionResult::clear(Method::ServiceLevel); records.len()];
        let mut evaluated = 0usize;
        let mut largest = 0usize;
        let mut skipped: Option<Abstention> = None;
        for (category, idx) in dataset.partitions() {
            largest = largest.max(idx.len());
            let values: Vec<f64> = idx.iter().map(|&i| records[i].amount()).collect();
            match zscore_test(&values, self.threshold, self.min_samples, Method::ServiceLevel) {
                Ok(scored) => {
                    evaluated += 1;
                    for (&i, r) in idx.iter().zip(scored) { results[i] = r; }
                }
                Err(Abstention::InsufficientData { actual, .. }) => debug!(category, actual, "below min_samples, skipped"),
                Err(reason) => { debug!(category, %reason, "skipped"); skipped = Some(reason); }
            }
        }
        if evaluated == 0 {
            let reason = skipped.unwrap_or(Abstention::InsufficientData { required: self.min_samples, actual: largest });
            warn!(%reason, "service-level abstained");
            return Err(reason);
        }
        info!(partitions = evaluated, flagged = results.iter().filter(|d| d.is_anomalous).count(), "service-level complete");
        Ok(results)
    }
}
