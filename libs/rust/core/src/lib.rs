//! Multi-method cost anomaly detection.
//!
//! A validated [`Dataset`] of daily cost records is scored independently by
//! four methods (seeded isolation-style forest, global z-score, IQR fences,
//! per-category z-score). A record is anomalous when at least `min_agreement`
//! of them flag it; anomalies become severity-ranked [`Alert`]s.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod forest;
pub mod metrics;
pub mod record;
pub mod report;
pub mod scorer;
pub mod severity;
pub mod stats;

pub use config::{load_config, AppConfig, DetectorConfig};
pub use consensus::ConsensusVerdict;
pub use engine::AnomalyEngine;
pub use error::{Abstention, DetectionError, RecordError};
pub use forest::{FittedModel, OutlierModel, RandomPartitionForest};
pub use metrics::{detection_metrics, DetectionMetrics, RunMetrics, DETECTION_METRICS};
pub use record::{CostRecord, Dataset, DatasetStats, RawCostRecord};
pub use report::{Alert, AlertReport, AnnotatedRecord, DetectionReport, MethodStatus, Summary};
pub use scorer::{DetectionResult, Method, Scorer};
pub use severity::{Severity, SeverityPolicy};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub fn init_tracing(service: &str) -> Result<()> { init_tracing_with(service, "info") }

/// Installs the global subscriber once per process. `RUST_LOG` wins over
/// `default_filter`; `FINOPS_JSON_LOG=1` switches to JSON lines.
pub fn init_tracing_with(service: &str, default_filter: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("FINOPS_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let fmt_layer = if json {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .boxed()
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        assert!(init_tracing("finops-test").is_ok());
        assert!(init_tracing("finops-test").is_ok());
    }
}
