//! Joins the per-method results into one verdict per record.
//!
//! `combined_score` is the arithmetic mean of the normalized [0, 1] scores of
//! the methods that flagged the record (0 when none did), so it is monotonic
//! in every contributing score.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

use crate::record::Dataset;
use crate::scorer::{DetectionResult, Method, MethodOutcome};
use crate::stats::Welford;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusVerdict {
    pub is_anomalous: bool,
    pub contributing_methods: BTreeSet<Method>,
    pub combined_score: f64,
    /// Expected cost the deviation is measured against.
    pub baseline: f64,
    pub deviation_pct: f64,
}

impl ConsensusVerdict {
    /// Fraction of all voices that flagged the record.
    pub fn confidence(&self) -> f64 { self.contributing_methods.len() as f64 / Method::ALL.len() as f64 }
}

/// Category mean when the category has at least `min_samples` records,
/// otherwise the global mean. Running means stay finite where a plain sum
/// of large amounts would overflow.
pub fn baselines(dataset: &Dataset, min_samples: usize) -> Vec<f64> {
    let records = dataset.records();
    let global = records.iter().map(|r| r.amount()).collect::<Welford>().mean();
    let mut out = vec![global; records.len()];
    for (_, idx) in dataset.partitions() {
        if idx.len() < min_samples { continue; }
        let m = idx.iter().map(|&i| records[i].amount()).collect::<Welford>().mean();
        for &i in idx { out[i] = m; }
    }
    out
}

pub fn deviation_pct(amount: f64, baseline: f64) -> f64 {
    if baseline > 0.0 { (amount - baseline) / baseline * 100.0 } else { 0.0 }
}

#[instrument(name = "aggregate_flags", skip_all, fields(records = dataset.len(), min_agreement = min_agreement))]
pub fn aggregate(dataset: &Dataset, outcomes: &BTreeMap<Method, MethodOutcome>, min_agreement: usize, min_samples: usize) -> Vec<ConsensusVerdict> {
    let base = baselines(dataset, min_samples);
    dataset
        .records()
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let flagged: Vec<&DetectionResult> = outcomes
                .values()
                .filter_map(|o| o.as_ref().ok())
                .filter_map(|results| results.get(i))
                .filter(|r| r.is_anomalous)
                .collect();
            let contributing_methods: BTreeSet<Method> = flagged.iter().map(|r| r.method).collect();
            let combined_score = if flagged.is_empty() { 0.0 } else { flagged.iter().map(|r| r.normalized).sum::<f64>() / flagged.len() as f64 };
            ConsensusVerdict {
                is_anomalous: contributing_methods.len() >= min_agreement,
                contributing_methods,
                combined_score,
                baseline: base[i],
                deviation_pct: deviation_pct(rec.amount(), base[i]),
            }
        })
        .collect()
}
