use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use finops_core::DetectionReport;

/// Writes `<dir>/alerts_<YYYYMMDD_HHMMSS>.json` and returns its path.
pub fn write_alert_report(dir: &Path, report: &DetectionReport, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("alerts_{}.json", now.format("%Y%m%d_%H%M%S")));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &report.alert_report(now))?;
    out.flush()?;
    Ok(path)
}
