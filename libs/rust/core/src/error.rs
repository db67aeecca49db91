use serde::Serialize;
use thiserror::Error;

/// Fatal errors: surfaced to the caller before any detection runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("invalid configuration: `{parameter}` {reason}")]
    InvalidConfiguration { parameter: &'static str, reason: String },
    #[error("malformed record at row {row}: {source}")]
    MalformedRecord { row: usize, #[source] source: RecordError },
}

impl DetectionError {
    pub(crate) fn config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { parameter, reason: reason.into() }
    }
}

/// Why a raw row could not become a `CostRecord`.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordError {
    #[error("missing required field `{0}`")] MissingField(&'static str),
    #[error("unparseable date {0:?}")] InvalidDate(String),
    #[error("unparseable amount {0:?}")] InvalidAmount(String),
    #[error("negative amount {0}")] NegativeAmount(f64),
}

/// Local, recoverable conditions. A scorer returning one of these abstains
/// from the consensus instead of failing the run.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Abstention {
    #[error("insufficient data: {actual} < {required} samples")]
    InsufficientData { required: usize, actual: usize },
    #[error("degenerate distribution: zero spread in {method} input")]
    DegenerateDistribution { method: &'static str },
    #[error("non-finite spread in {method} input")]
    NonFiniteSpread { method: &'static str },
}
