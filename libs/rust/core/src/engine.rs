//! Detection engine: runs every scorer over one dataset, joins the results and
//! builds the report.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::DetectorConfig;
use crate::consensus::aggregate;
use crate::error::DetectionError;
use crate::forest::{OutlierModel, RandomPartitionForest};
use crate::metrics::{record_run, RunMetrics};
use crate::record::Dataset;
use crate::report::{generate_alerts, method_status, AnnotatedRecord, DetectionReport, Summary};
use crate::scorer::{EnsembleScorer, Evaluation, IqrScorer, Method, MethodOutcome, Scorer, ServiceLevelScorer, ZScoreScorer};

/// Holds validated parameters and the scorers built from them. A run never
/// mutates the engine, so one engine can serve many datasets.
pub struct AnomalyEngine {
    config: DetectorConfig,
    scorers: Vec<Box<dyn Scorer>>,
}

impl std::fmt::Debug for AnomalyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyEngine")
            .field("config", &self.config)
            .field("scorers", &self.scorers.iter().map(|s| s.method()).collect::<Vec<_>>())
            .finish()
    }
}

impl AnomalyEngine {
    /// Uses the built-in seeded forest as the ensemble model.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        let forest = RandomPartitionForest::new(config.n_estimators, config.max_samples, config.random_seed);
        Self::with_model(config, forest)
    }

    /// Same engine with a caller-supplied ensemble model.
    pub fn with_model<M: OutlierModel + 'static>(config: DetectorConfig, model: M) -> Result<Self, DetectionError> {
        config.validate()?;
        let scorers: Vec<Box<dyn Scorer>> = vec![
            Box::new(EnsembleScorer::new(model, config.contamination, config.min_samples, config.include_weekday)),
            Box::new(ZScoreScorer::new(config.z_score_threshold, config.min_samples)),
            Box::new(IqrScorer::new(config.iqr_multiplier, config.min_samples)),
            Box::new(ServiceLevelScorer::new(config.z_score_threshold, config.min_samples)),
        ];
        Ok(Self { config, scorers })
    }

    pub fn config(&self) -> &DetectorConfig { &self.config }

    pub fn detect(&self, dataset: &Dataset) -> DetectionReport { self.detect_at(dataset, Utc::now()) }

    /// `now` stamps the alerts; fixing it makes the whole report reproducible.
    #[instrument(name = "detect", skip_all, fields(records = dataset.len(), parallel = self.config.parallel))]
    pub fn detect_at(&self, dataset: &Dataset, now: DateTime<Utc>) -> DetectionReport {
        let start = Instant::now();
        for rejected in dataset.rejected() {
            warn!(error = %rejected, "row rejected at ingestion");
        }

        let evaluations: Vec<(Method, Evaluation)> = if self.config.parallel {
            self.scorers.par_iter().map(|s| (s.method(), s.evaluate(dataset))).collect()
        } else {
            self.scorers.iter().map(|s| (s.method(), s.evaluate(dataset))).collect()
        };
        let mut iqr_fences = None;
        let mut outcomes: BTreeMap<Method, MethodOutcome> = BTreeMap::new();
        for (method, evaluation) in evaluations {
            if method == Method::Iqr { iqr_fences = evaluation.fences; }
            outcomes.insert(method, evaluation.outcome);
        }

        let verdicts = aggregate(dataset, &outcomes, self.config.min_agreement, self.config.min_samples);
        let records: Vec<AnnotatedRecord> = dataset
            .records()
            .iter()
            .zip(verdicts)
            .enumerate()
            .map(|(i, (record, verdict))| AnnotatedRecord {
                record: record.clone(),
                verdict,
                method_results: outcomes.values().filter_map(|o| o.as_ref().ok()).filter_map(|r| r.get(i).copied()).collect(),
            })
            .collect();

        for r in records.iter().filter(|r| r.verdict.is_anomalous) {
            warn!(
                date = %r.record.date(),
                category = r.record.category(),
                amount = r.record.amount(),
                methods = r.verdict.contributing_methods.len(),
                deviation_pct = r.verdict.deviation_pct,
                "cost anomaly"
            );
        }

        let summary = Summary::from_records(&records, dataset.rejected().len());
        let alerts = generate_alerts(&records, &self.config.severity, now);
        let metrics = RunMetrics {
            records_processed: summary.total_records,
            records_rejected: summary.rejected_records,
            anomalies: summary.anomaly_count,
            total_cost: summary.total_cost,
            anomalous_cost: summary.anomalous_cost,
            processing_duration: start.elapsed(),
        };
        record_run(&metrics, records.iter().filter(|r| r.verdict.is_anomalous).map(|r| r.record.amount()));
        info!(
            anomalies = summary.anomaly_count,
            rate = summary.anomaly_rate,
            alerts = alerts.len(),
            elapsed_ms = metrics.processing_duration.as_secs_f64() * 1000.0,
            "detection complete"
        );

        DetectionReport {
            method_status: outcomes.iter().map(|(m, o)| (*m, method_status(o))).collect(),
            iqr_fences,
            dataset_stats: dataset.stats(),
            records,
            summary,
            alerts,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Abstention;
    use crate::forest::{FeatureVector, FittedModel};
    use crate::record::RawCostRecord;
    use crate::report::MethodStatus;

    /// Scores each row by its distance from the median of the first column.
    struct MedianDistance;

    struct FittedMedian(f64);

    impl OutlierModel for MedianDistance {
        type Fitted = FittedMedian;
        fn name(&self) -> &'static str { "median_distance" }
        fn fit(&self, features: &[FeatureVector]) -> Result<FittedMedian, Abstention> {
            let column: Vec<f64> = features.iter().map(|f| f[0]).collect();
            Ok(FittedMedian(crate::stats::percentile(&crate::stats::sorted(&column), 50.0)))
        }
    }

    impl FittedModel for FittedMedian {
        fn score(&self, features: &[FeatureVector]) -> Vec<f64> { features.iter().map(|f| (f[0] - self.0).abs()).collect() }
    }

    fn spiky() -> Dataset {
        let values: Vec<String> = (0..28).map(|i| if i == 17 { "2500".into() } else { (100 + i % 6).to_string() }).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        ec2(&refs)
    }

    fn forest_results(report: &DetectionReport) -> Vec<f64> {
        report.records.iter().flat_map(|r| r.method_results.iter().filter(|d| d.method == Method::IsolationForest).map(|d| d.score)).collect()
    }

    fn ec2(values: &[&str]) -> Dataset {
        Dataset::ingest(values.iter().enumerate().map(|(i, v)| RawCostRecord::new(&format!("2025-01-{:02}", i + 1), "EC2", v)))
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = DetectorConfig { min_agreement: 9, ..Default::default() };
        assert!(matches!(AnomalyEngine::new(cfg), Err(DetectionError::InvalidConfiguration { parameter: "min_agreement", .. })));
    }

    #[test]
    fn small_dataset_abstains_everywhere() {
        let engine = AnomalyEngine::new(DetectorConfig::default()).unwrap();
        let report = engine.detect(&ec2(&["1", "2", "300"]));
        assert_eq!(report.summary.anomaly_count, 0);
        assert_eq!(report.records.len(), 3);
        assert!(report.method_status.values().all(|s| matches!(s, MethodStatus::Abstained { .. })));
        assert!(matches!(
            report.method_status[&Method::ZScore],
            MethodStatus::Abstained { reason: Abstention::InsufficientData { required: 7, actual: 3 } }
        ));
        assert!(report.iqr_fences.is_none());
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn rejected_rows_are_counted_not_scored() {
        let mut raw: Vec<RawCostRecord> = (1..=8).map(|d| RawCostRecord::new(&format!("2025-01-{d:02}"), "EC2", "100")).collect();
        raw.push(RawCostRecord::new("not-a-date", "EC2", "100"));
        raw.push(RawCostRecord::new("2025-01-10", "EC2", "-4"));
        let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&Dataset::ingest(raw));
        assert_eq!(report.summary.total_records, 8);
        assert_eq!(report.summary.rejected_records, 2);
        assert_eq!(report.rows_received(), 10);
        assert_eq!(report.metrics.records_rejected, 2);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let values: Vec<String> = (0..40).map(|i| if i == 17 { "2500".into() } else { (100 + i % 6).to_string() }).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let ds = ec2(&refs[..28]);
        let now = Utc::now();
        let seq = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect_at(&ds, now);
        let par = AnomalyEngine::new(DetectorConfig { parallel: true, ..Default::default() }).unwrap().detect_at(&ds, now);
        assert_eq!(seq.records, par.records);
        assert_eq!(seq.alerts, par.alerts);
        assert!(seq.records[17].verdict.is_anomalous);
    }

    #[test]
    fn reported_fences_come_from_the_iqr_run() {
        let ds = spiky();
        let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&ds);
        let expected = IqrScorer::new(1.5, 7).fences(&ds.amounts()).unwrap();
        assert_eq!(report.iqr_fences, Some(expected));
        assert_eq!(report.method_status[&Method::Iqr], MethodStatus::Ran { flagged: 1 });
    }

    #[test]
    fn custom_model_drives_the_ensemble_vote() {
        let engine = AnomalyEngine::with_model(DetectorConfig::default(), MedianDistance).unwrap();
        let report = engine.detect(&spiky());
        assert_eq!(report.method_status[&Method::IsolationForest], MethodStatus::Ran { flagged: 1 });
        let spike = &report.records[17];
        assert!(spike.method_results.iter().any(|d| d.method == Method::IsolationForest && d.is_anomalous));
        assert!(spike.verdict.contributing_methods.contains(&Method::IsolationForest));
        assert!(spike.verdict.is_anomalous);
    }

    #[test]
    fn weekday_feature_changes_forest_scores_not_the_verdict() {
        let ds = spiky();
        let now = Utc::now();
        let plain = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect_at(&ds, now);
        let weekly = AnomalyEngine::new(DetectorConfig { include_weekday: true, ..Default::default() }).unwrap().detect_at(&ds, now);
        assert!(matches!(weekly.method_status[&Method::IsolationForest], MethodStatus::Ran { .. }));
        assert_ne!(forest_results(&plain), forest_results(&weekly));
        assert!(weekly.records[17].verdict.is_anomalous);
        assert_eq!(plain.anomalies().count(), weekly.anomalies().count());
    }
}
