use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use finops_core::{init_tracing_with, load_config, AnomalyEngine, MethodStatus};
use tracing::{error, info, warn};

mod ingest;
mod output;

const SERVICE: &str = "finops-detector";

/// Runs `job` on a blocking worker and gives up after `budget`. On timeout the
/// runtime is shut down without waiting, so a stuck job cannot hold the
/// process open once the caller returns.
fn run_bounded<T, F>(budget: Duration, job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let outcome = rt.block_on(async { tokio::time::timeout(budget, tokio::task::spawn_blocking(job)).await });
    match outcome {
        Ok(joined) => joined?,
        Err(_) => {
            error!(timeout_secs = budget.as_secs(), "detection run timed out");
            rt.shutdown_background();
            Err(anyhow!("detection run exceeded {}s", budget.as_secs()))
        }
    }
}

fn main() -> Result<()> {
    let mut cfg = load_config(SERVICE)?;
    init_tracing_with(SERVICE, &cfg.log_level)?;
    if let Some(path) = std::env::args_os().nth(1) {
        cfg.input_path = path.into();
    }
    info!(?cfg, "config loaded");

    let engine = AnomalyEngine::new(cfg.detector.clone())?;
    let input = cfg.input_path.clone();
    let budget = Duration::from_secs(cfg.run_timeout_secs);

    // csv parsing and scoring are CPU-bound; keep them off the async workers
    let report = run_bounded(budget, move || {
        let dataset = ingest::load_csv_file(&input)?;
        Ok(engine.detect(&dataset))
    })?;

    for (method, status) in &report.method_status {
        if let MethodStatus::Abstained { reason } = status {
            warn!(%method, %reason, "method abstained");
        }
    }
    let s = &report.summary;
    info!(
        records = s.total_records,
        rejected = s.rejected_records,
        anomalies = s.anomaly_count,
        rate = s.anomaly_rate,
        total_cost = s.total_cost,
        anomalous_cost = s.anomalous_cost,
        "run summary"
    );
    for alert in &report.alerts {
        info!(id = %alert.alert_id, severity = %alert.severity, category = alert.record.category(), amount = alert.record.amount(), "{}", alert.recommendation);
    }

    let path = output::write_alert_report(&cfg.output_dir, &report, Utc::now())?;
    info!(path = %path.display(), alerts = report.alerts.len(), "alert report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn finished_job_returns_its_value() {
        assert_eq!(run_bounded(Duration::from_secs(5), || Ok(42)).unwrap(), 42);
    }

    #[test]
    fn job_errors_propagate() {
        let err = run_bounded::<(), _>(Duration::from_secs(5), || Err(anyhow!("bad input"))).unwrap_err();
        assert_eq!(err.to_string(), "bad input");
    }

    #[test]
    fn overrunning_job_is_abandoned_at_the_deadline() {
        let start = Instant::now();
        let err = run_bounded(Duration::from_secs(1), || {
            std::thread::sleep(Duration::from_secs(10));
            Ok(())
        })
        .unwrap_err();
        assert!(err.to_string().contains("exceeded 1s"));
        assert!(start.elapsed() < Duration::from_secs(5), "returned after {:?}", start.elapsed());
    }
}
