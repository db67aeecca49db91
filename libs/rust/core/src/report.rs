//! Run output: annotated records, summary, alerts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::consensus::ConsensusVerdict;
use crate::error::Abstention;
use crate::metrics::RunMetrics;
use crate::record::{CostRecord, DatasetStats};
use crate::scorer::{DetectionResult, IqrFences, Method};
use crate::severity::{recommendation, severity_score, Severity, SeverityPolicy};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    pub record: CostRecord,
    pub verdict: ConsensusVerdict,
    /// Results of every method that ran (abstaining methods are absent).
    pub method_results: Vec<DetectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodStatus {
    Ran { flagged: usize },
    Abstained { reason: Abstention },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub total_records: usize,
    pub anomaly_count: usize,
    pub anomaly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_records: usize,
    pub anomaly_count: usize,
    pub anomaly_rate: f64,
    pub total_cost: f64,
    pub anomalous_cost: f64,
    pub rejected_records: usize,
    pub methods_used: BTreeMap<Method, usize>,
    pub by_category: BTreeMap<String, CategorySummary>,
}

fn rate(part: usize, whole: usize) -> f64 { if whole == 0 { 0.0 } else { part as f64 / whole as f64 } }

impl Summary {
    pub fn from_records(records: &[AnnotatedRecord], rejected_records: usize) -> Self {
        let anomalies: Vec<&AnnotatedRecord> = records.iter().filter(|r| r.verdict.is_anomalous).collect();
        let mut methods_used: BTreeMap<Method, usize> = Method::ALL.iter().map(|m| (*m, 0)).collect();
        for r in records {
            for d in r.method_results.iter().filter(|d| d.is_anomalous) { *methods_used.entry(d.method).or_default() += 1; }
        }
        let mut by_category: BTreeMap<String, CategorySummary> = BTreeMap::new();
        for r in records {
            let c = by_category.entry(r.record.category().to_string()).or_insert(CategorySummary { total_records: 0, anomaly_count: 0, anomaly_rate: 0.0 });
            c.total_records += 1;
            if r.verdict.is_anomalous { c.anomaly_count += 1; }
        }
        for c in by_category.values_mut() { c.anomaly_rate = rate(c.anomaly_count, c.total_records); }
        Self {
            total_records: records.len(),
            anomaly_count: anomalies.len(),
            anomaly_rate: rate(anomalies.len(), records.len()),
            total_cost: records.iter().map(|r| r.record.amount()).sum(),
            anomalous_cost: anomalies.iter().map(|r| r.record.amount()).sum(),
            rejected_records,
            methods_used,
            by_category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub alert_id: String,
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
    pub severity_score: f64,
    pub record: CostRecord,
    pub verdict: ConsensusVerdict,
    /// Human-readable names of the methods that flagged the record.
    pub detection_methods: Vec<&'static str>,
    pub details: Vec<DetectionResult>,
    pub recommendation: String,
}

/// One alert per anomalous record, ids `ALERT-<YYYYMMDD-HHMMSS>-<record index>`,
/// ordered by severity, then combined score, then record order.
#[instrument(name = "generate_alerts", skip_all, fields(records = records.len()))]
pub fn generate_alerts(records: &[AnnotatedRecord], policy: &SeverityPolicy, now: DateTime<Utc>) -> Vec<Alert> {
    let stamp = now.format("%Y%m%d-%H%M%S");
    let mut alerts: Vec<Alert> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.verdict.is_anomalous)
        .map(|(i, r)| {
            let v = &r.verdict;
            let votes = v.contributing_methods.len();
            let severity = policy.classify(votes, v.combined_score, v.deviation_pct);
            Alert {
                alert_id: format!("ALERT-{stamp}-{i:05}"),
                created_at: now,
                severity,
                severity_score: severity_score(votes),
                record: r.record.clone(),
                verdict: v.clone(),
                detection_methods: v.contributing_methods.iter().map(Method::label).collect(),
                details: r.method_results.clone(),
                recommendation: recommendation(severity, r.record.category(), r.record.amount(), v.deviation_pct),
            }
        })
        .collect();
    // stable sort keeps record order among equals
    alerts.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.verdict.combined_score.total_cmp(&a.verdict.combined_score)));
    info!(alerts = alerts.len(), critical = alerts.iter().filter(|a| a.severity == Severity::Critical).count(), "alerts generated");
    alerts
}

pub fn severity_distribution(alerts: &[Alert]) -> BTreeMap<Severity, usize> {
    let mut dist: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for a in alerts { *dist.entry(a.severity).or_default() += 1; }
    dist
}

/// Everything one detection run produced.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub records: Vec<AnnotatedRecord>,
    pub method_status: BTreeMap<Method, MethodStatus>,
    pub iqr_fences: Option<IqrFences>,
    pub dataset_stats: Option<DatasetStats>,
    pub summary: Summary,
    pub alerts: Vec<Alert>,
    pub metrics: RunMetrics,
}

impl DetectionReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &AnnotatedRecord> { self.records.iter().filter(|r| r.verdict.is_anomalous) }

    /// Rows received by the engine, accepted or not.
    pub fn rows_received(&self) -> usize { self.summary.total_records + self.summary.rejected_records }

    pub fn alert_report(&self, generated_at: DateTime<Utc>) -> AlertReport<'_> {
        AlertReport {
            generated_at,
            summary: &self.summary,
            method_status: &self.method_status,
            iqr_fences: self.iqr_fences,
            alert_count: self.alerts.len(),
            severity_distribution: severity_distribution(&self.alerts),
            alerts: &self.alerts,
        }
    }
}

/// JSON document handed to the alerting collaborator.
#[derive(Debug, Serialize)]
pub struct AlertReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub summary: &'a Summary,
    /// Lets consumers tell "nothing flagged" apart from "method abstained".
    pub method_status: &'a BTreeMap<Method, MethodStatus>,
    pub iqr_fences: Option<IqrFences>,
    pub alerts: &'a [Alert],
    pub alert_count: usize,
    pub severity_distribution: BTreeMap<Severity, usize>,
}

pub(crate) fn method_status(outcome: &Result<Vec<DetectionResult>, Abstention>) -> MethodStatus {
    match outcome {
        Ok(results) => MethodStatus::Ran { flagged: results.iter().filter(|d| d.is_anomalous).count() },
        Err(reason) => MethodStatus::Abstained { reason: reason.clone() },
    }
}
