//! OpenTelemetry instruments for detection runs. Without an installed meter
//! provider these are no-ops; the same numbers are always returned to the
//! caller as `RunMetrics`.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DetectionMetrics {
    pub records_ingested_total: Counter<u64>,
    pub records_rejected_total: Counter<u64>,
    pub anomalies_total: Counter<u64>,
    pub anomaly_amount_usd: Gauge<f64>,
    pub cost_analyzed_usd: Gauge<f64>,
    pub processing_duration_seconds: Histogram<f64>,
}

static DETECTION_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("finops_detection"));

pub static DETECTION_METRICS: Lazy<DetectionMetrics> = Lazy::new(|| DetectionMetrics {
    records_ingested_total: DETECTION_METER.u64_counter("finops_records_ingested_total")
        .with_description("Total number of cost records ingested")
        .build(),
    records_rejected_total: DETECTION_METER.u64_counter("finops_records_rejected_total")
        .with_description("Rows rejected as malformed at ingestion")
        .build(),
    anomalies_total: DETECTION_METER.u64_counter("finops_anomalies_detected_total")
        .with_description("Total number of cost anomalies detected")
        .build(),
    anomaly_amount_usd: DETECTION_METER.f64_gauge("finops_anomaly_amount_usd")
        .with_description("Dollar amount of the last detected anomaly")
        .with_unit("USD")
        .build(),
    cost_analyzed_usd: DETECTION_METER.f64_gauge("finops_total_cost_analyzed_usd")
        .with_description("Total cost amount analyzed in the last run")
        .with_unit("USD")
        .build(),
    processing_duration_seconds: DETECTION_METER.f64_histogram("finops_processing_duration_seconds")
        .with_description("Time spent processing cost data")
        .with_unit("s")
        .with_boundaries(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0])
        .build(),
});

pub fn detection_metrics() -> &'static DetectionMetrics { &DETECTION_METRICS }

/// Plain per-run numbers for whoever exports or displays them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub records_processed: usize,
    pub records_rejected: usize,
    pub anomalies: usize,
    pub total_cost: f64,
    pub anomalous_cost: f64,
    #[serde(with = "duration_secs")]
    pub processing_duration: Duration,
}

pub(crate) fn record_run(run: &RunMetrics, anomalous_amounts: impl Iterator<Item = f64>) {
    let m = detection_metrics();
    m.records_ingested_total.add(run.records_processed as u64, &[]);
    if run.records_rejected > 0 { m.records_rejected_total.add(run.records_rejected as u64, &[]); }
    for amount in anomalous_amounts {
        m.anomalies_total.add(1, &[]);
        m.anomaly_amount_usd.record(amount, &[]);
    }
    m.cost_analyzed_usd.record(run.total_cost, &[]);
    m.processing_duration_seconds.record(run.processing_duration.as_secs_f64(), &[KeyValue::new("stage", "detect")]);
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> { s.serialize_f64(d.as_secs_f64()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_noop() {
        let run = RunMetrics { records_processed: 3, records_rejected: 1, anomalies: 1, total_cost: 10.0, anomalous_cost: 7.0, processing_duration: Duration::from_millis(5) };
        record_run(&run, [7.0].into_iter());
        let v = serde_json::to_value(&run).unwrap();
        assert_eq!(v["processing_duration"], 0.005);
    }
}
