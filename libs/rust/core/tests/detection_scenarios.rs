use chrono::{Days, NaiveDate, TimeZone, Utc};
use finops_core::{AnomalyEngine, Dataset, DetectorConfig, Method, MethodStatus, RawCostRecord, Severity};

const SPIKES: [usize; 6] = [20, 50, 80, 110, 140, 170];

fn day(i: usize) -> String {
    (NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Days::new(i as u64)).to_string()
}

/// 181 days of flat spend in [95, 105] with six large spikes.
fn half_year() -> Dataset {
    let categories = ["EC2", "RDS", "S3"];
    Dataset::ingest((0..181).map(|i| {
        let amount = match SPIKES.iter().position(|&s| s == i) {
            Some(k) => 900.0 + 100.0 * k as f64,
            None => 100.0 + ((i * 7) % 11) as f64 - 5.0,
        };
        RawCostRecord::new(&day(i), categories[i % 3], &amount.to_string())
    }))
}

#[test]
fn single_spike_in_a_week_of_ec2() {
    let raw = ["150", "160", "155", "158", "152", "1234.56", "161"];
    let ds = Dataset::ingest(raw.iter().enumerate().map(|(i, a)| RawCostRecord::new(&day(i), "EC2", a)));
    let cfg = DetectorConfig { min_samples: 5, ..Default::default() };
    let report = AnomalyEngine::new(cfg).unwrap().detect(&ds);

    let fences = report.iqr_fences.expect("iqr ran");
    assert!((fences.lower - 143.0).abs() < 1e-9);
    assert!((fences.upper - 171.0).abs() < 1e-9);

    assert_eq!(report.summary.anomaly_count, 1);
    let spike = &report.records[5];
    assert!(spike.verdict.is_anomalous);
    assert!(spike.verdict.contributing_methods.contains(&Method::Iqr));
    assert!(spike.verdict.contributing_methods.contains(&Method::IsolationForest));
    // seven points cannot produce |z| > 3 with the sample deviation
    assert!(!spike.verdict.contributing_methods.contains(&Method::ZScore));
    assert!((spike.verdict.baseline - 310.08).abs() < 1e-9);
    assert!((spike.verdict.deviation_pct - 298.14).abs() < 0.01);

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].severity, Severity::Critical);
    assert!(report.alerts[0].recommendation.starts_with("IMMEDIATE ACTION REQUIRED"));
}

#[test]
fn half_year_flags_exactly_the_spikes() {
    let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&half_year());
    let flagged: Vec<usize> = report.records.iter().enumerate().filter(|(_, r)| r.verdict.is_anomalous).map(|(i, _)| i).collect();
    assert_eq!(flagged, SPIKES);
    assert_eq!(report.summary.total_records, 181);
    assert_eq!(report.summary.anomaly_count, 6);
    assert!((report.summary.anomaly_rate - 6.0 / 181.0).abs() < 1e-12);
    assert_eq!(report.summary.anomalous_cost, 900.0 + 1000.0 + 1100.0 + 1200.0 + 1300.0 + 1400.0);
    for i in SPIKES {
        let v = &report.records[i].verdict;
        assert!(v.contributing_methods.contains(&Method::ZScore));
        assert!(v.contributing_methods.contains(&Method::Iqr));
    }
    assert!(report.method_status.values().all(|s| matches!(s, MethodStatus::Ran { .. })));
}

#[test]
fn summary_and_alerts_agree() {
    let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&half_year());
    let s = &report.summary;
    assert_eq!(s.anomaly_count, report.alerts.len());
    assert_eq!(s.anomaly_count, report.anomalies().count());
    assert_eq!(s.by_category.values().map(|c| c.total_records).sum::<usize>(), s.total_records);
    assert_eq!(s.by_category.values().map(|c| c.anomaly_count).sum::<usize>(), s.anomaly_count);
    assert!((s.total_cost - report.dataset_stats.as_ref().unwrap().total_cost).abs() < 1e-6);
    assert!(s.anomalous_cost <= s.total_cost);

    let doc = report.alert_report(Utc::now());
    assert_eq!(doc.severity_distribution.values().sum::<usize>(), doc.alert_count);
    let ids: std::collections::BTreeSet<&str> = report.alerts.iter().map(|a| a.alert_id.as_str()).collect();
    assert_eq!(ids.len(), report.alerts.len());
    assert!(report.alerts.windows(2).all(|w| w[0].severity >= w[1].severity));
}

#[test]
fn sparse_category_uses_global_baseline() {
    let mut raw: Vec<RawCostRecord> = (0..30).map(|i| RawCostRecord::new(&day(i), "EC2", &(100 + i % 5).to_string())).collect();
    raw.extend((0..3).map(|i| RawCostRecord::new(&day(i), "Lambda", "5")));
    let ds = Dataset::ingest(raw);
    let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&ds);
    let global = ds.total_cost() / ds.len() as f64;
    for r in report.records.iter().filter(|r| r.record.category() == "Lambda") {
        let service = r.method_results.iter().find(|d| d.method == Method::ServiceLevel).unwrap();
        assert!(!service.is_anomalous);
        assert!((r.verdict.baseline - global).abs() < 1e-9);
    }
}

#[test]
fn identical_amounts_flag_nothing() {
    let ds = Dataset::ingest((0..30).map(|i| RawCostRecord::new(&day(i), "EC2", "42.00")));
    let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&ds);
    assert_eq!(report.summary.anomaly_count, 0);
    assert!(report.alerts.is_empty());
    for m in [Method::ZScore, Method::Iqr, Method::ServiceLevel] {
        assert!(matches!(report.method_status[&m], MethodStatus::Abstained { .. }), "{m} should abstain");
    }
    assert_eq!(report.method_status[&Method::IsolationForest], MethodStatus::Ran { flagged: 0 });
}

#[test]
fn empty_dataset_is_a_valid_run() {
    let report = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect(&Dataset::default());
    assert_eq!(report.summary.total_records, 0);
    assert_eq!(report.summary.anomaly_rate, 0.0);
    assert!(report.dataset_stats.is_none());
}

#[test]
fn same_seed_same_report() {
    let ds = half_year();
    let now = Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap();
    let a = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect_at(&ds, now);
    let b = AnomalyEngine::new(DetectorConfig::default()).unwrap().detect_at(&ds, now);
    assert_eq!(a.records, b.records);
    assert_eq!(a.alerts, b.alerts);
    assert_eq!(a.summary, b.summary);
}

#[test]
fn stricter_agreement_never_adds_anomalies() {
    let ds = half_year();
    let mut previous = usize::MAX;
    for min_agreement in 1..=4 {
        let cfg = DetectorConfig { min_agreement, ..Default::default() };
        let n = AnomalyEngine::new(cfg).unwrap().detect(&ds).summary.anomaly_count;
        assert!(n <= previous);
        previous = n;
    }
}
