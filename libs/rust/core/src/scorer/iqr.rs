//! IQR with Tukey fences: `[Q1 - k*IQR, Q3 + k*IQR]`.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{ensure_samples, DetectionResult, Evaluation, Method, MethodOutcome, Scorer};
use crate::error::Abstention;
use crate::record::Dataset;
use crate::stats::{self, SPREAD_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrFences {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFences {
    pub fn iqr(&self) -> f64 { self.q3 - self.q1 }

    /// Distance outside the nearest fence in IQR units, 0 inside.
    pub fn distance(&self, x: f64) -> f64 {
        if x < self.lower { (self.lower - x) / self.iqr() } else if x > self.upper { (x - self.upper) / self.iqr() } else { 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct IqrScorer {
    multiplier: f64,
    min_samples: usize,
}

impl IqrScorer {
    pub fn new(multiplier: f64, min_samples: usize) -> Self { Self { multiplier, min_samples } }

    pub fn fences(&self, values: &[f64]) -> Result<IqrFences, Abstention> {
        ensure_samples(values.len(), self.min_samples)?;
        let sorted = stats::sorted(values);
        let q1 = stats::percentile(&sorted, 25.0);
        let q3 = stats::percentile(&sorted, 75.0);
        let iqr = q3 - q1;
        if !iqr.is_finite() || iqr <= SPREAD_EPSILON {
            return Err(Abstention::DegenerateDistribution { method: Method::Iqr.name() });
        }
        Ok(IqrFences { q1, q3, lower: q1 - self.multiplier * iqr, upper: q3 + self.multiplier * iqr })
    }
}

impl Scorer for IqrScorer {
    fn method(&self) -> Method { Method::Iqr }

    fn score(&self, dataset: &Dataset) -> MethodOutcome { self.evaluate(dataset).outcome }

    #[instrument(name = "iqr_detection", skip_all, fields(records = dataset.len()))]
    fn evaluate(&self, dataset: &Dataset) -> Evaluation {
        let amounts = dataset.amounts();
        let fences = match self.fences(&amounts) {
            Ok(f) => f,
            Err(reason) => {
                warn!(%reason, "iqr abstained");
                return Evaluation { outcome: Err(reason), fences: None };
            }
        };
        let results: Vec<_> = amounts
            .iter()
            .map(|&x| {
                let d = fences.distance(x);
                let flagged = x < fences.lower || x > fences.upper;
                DetectionResult { method: Method::Iqr, is_anomalous: flagged, score: d, normalized: if flagged { d / (d + self.multiplier) } else { 0.0 } }
            })
            .collect();
        info!(flagged = results.iter().filter(|d| d.is_anomalous).count(), lower = fences.lower, upper = fences.upper, "iqr complete");
        Evaluation { outcome: Ok(results), fences: Some(fences) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawCostRecord;

    fn dataset(values: &[f64]) -> Dataset {
        Dataset::ingest(values.iter().enumerate().map(|(i, v)| RawCostRecord::new(&format!("2025-01-{:02}", i % 28 + 1), "EC2", &v.to_string())))
    }

    #[test]
    fn uniform_series_has_no_outliers() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        let r = IqrScorer::new(1.5, 7).score(&dataset(&values)).unwrap();
        assert!(r.iter().all(|d| !d.is_anomalous));
    }

    #[test]
    fn spike_outside_upper_fence() {
        let values = [150.0, 160.0, 155.0, 158.0, 152.0, 1234.56, 161.0];
        let scorer = IqrScorer::new(1.5, 5);
        let f = scorer.fences(&values).unwrap();
        assert!((f.lower - 143.0).abs() < 1e-9);
        assert!((f.upper - 171.0).abs() < 1e-9);
        let ds = dataset(&values);
        let r = scorer.score(&ds).unwrap();
        let spike = ds.records().iter().position(|rec| rec.amount() == 1234.56).unwrap();
        assert!(r[spike].is_anomalous);
        assert!((r[spike].score - (1234.56 - 171.0) / 7.0).abs() < 1e-9);
        assert_eq!(r.iter().filter(|d| d.is_anomalous).count(), 1);

        let eval = scorer.evaluate(&ds);
        assert_eq!(eval.fences, Some(f));
        assert_eq!(eval.outcome, Ok(r));
    }

    #[test]
    fn zero_spread_abstains() {
        let mut values = vec![10.0; 20];
        values[0] = 100.0;
        assert_eq!(IqrScorer::new(1.5, 7).fences(&values), Err(Abstention::DegenerateDistribution { method: "iqr" }));
    }

    #[test]
    fn below_min_samples_abstains() {
        assert!(matches!(IqrScorer::new(1.5, 7).fences(&[1.0, 2.0]), Err(Abstention::InsufficientData { .. })));
    }
}
