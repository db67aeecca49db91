//! Independent per-record scorers. Each one reads the shared dataset and
//! returns its own result vector (aligned with `Dataset::records()`), or an
//! `Abstention` when it cannot judge the input.

pub mod ensemble;
pub mod iqr;
pub mod service;
pub mod zscore;

use serde::Serialize;
use std::fmt;

use crate::error::Abstention;
use crate::record::Dataset;

pub use ensemble::EnsembleScorer;
pub use iqr::{IqrFences, IqrScorer};
pub use service::ServiceLevelScorer;
pub use zscore::ZScoreScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    IsolationForest,
    #[serde(rename = "zscore")]
    ZScore,
    Iqr,
    ServiceLevel,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::IsolationForest, Method::ZScore, Method::Iqr, Method::ServiceLevel];

    pub fn name(&self) -> &'static str {
        match self { Method::IsolationForest => "isolation_forest", Method::ZScore => "zscore", Method::Iqr => "iqr", Method::ServiceLevel => "service_level" }
    }

    pub fn label(&self) -> &'static str {
        match self { Method::IsolationForest => "Isolation Forest", Method::ZScore => "Z-Score", Method::Iqr => "IQR", Method::ServiceLevel => "Service-Level" }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// One method's judgement of one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    pub method: Method,
    pub is_anomalous: bool,
    /// Method-specific scale (z, fence distance in IQR units, isolation score).
    pub score: f64,
    /// Same judgement mapped to [0, 1]; 0 for records the method did not flag
    /// except the ensemble, whose isolation score is already in that range.
    pub normalized: f64,
}

impl DetectionResult {
    pub fn clear(method: Method) -> Self { Self { method, is_anomalous: false, score: 0.0, normalized: 0.0 } }
}

pub type MethodOutcome = Result<Vec<DetectionResult>, Abstention>;

/// A scorer's outcome plus the run-level decision bounds it derived, when it has any.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: MethodOutcome,
    pub fences: Option<IqrFences>,
}

pub trait Scorer: Send + Sync {
    fn method(&self) -> Method;
    fn score(&self, dataset: &Dataset) -> MethodOutcome;

    fn evaluate(&self, dataset: &Dataset) -> Evaluation {
        Evaluation { outcome: self.score(dataset), fences: None }
    }
}

pub(crate) fn ensure_samples(actual: usize, required: usize) -> Result<(), Abstention> {
    if actual < required { Err(Abstention::InsufficientData { required, actual }) } else { Ok(()) }
}
