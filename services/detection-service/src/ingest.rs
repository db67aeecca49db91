//! CSV cost-export loading.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use finops_core::{Dataset, RawCostRecord};
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("File not found: {path}: {reason}")]
    FileNotFound { path: String, reason: String },

    #[error("Failed to parse CSV header: {0}")]
    Header(#[from] csv::Error),

    #[error("CSV has no `{0}` column")]
    MissingColumn(&'static str),
}

/// Accepted header spellings, matched case-insensitively after trimming.
const DATE_HEADERS: &[&str] = &["date"];
const CATEGORY_HEADERS: &[&str] = &["category", "service_name", "service"];
const AMOUNT_HEADERS: &[&str] = &["amount", "cost_usd", "cost"];

#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_csv_file(path: &Path) -> Result<Dataset, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::FileNotFound { path: path.display().to_string(), reason: e.to_string() })?;
    load_csv(BufReader::new(file))
}

/// Rows that fail to parse still count: they reach the dataset as empty raw
/// rows and show up as rejected records with their row index.
pub fn load_csv<R: Read>(reader: R) -> Result<Dataset, LoadError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let headers: csv::StringRecord = reader.headers()?.iter().map(|h| h.to_ascii_lowercase()).collect();
    for (name, accepted) in [("date", DATE_HEADERS), ("category", CATEGORY_HEADERS), ("amount", AMOUNT_HEADERS)] {
        if !headers.iter().any(|h| accepted.contains(&h)) {
            return Err(LoadError::MissingColumn(name));
        }
    }
    reader.set_headers(headers);

    let rows: Vec<RawCostRecord> = reader
        .deserialize::<RawCostRecord>()
        .enumerate()
        .map(|(row, parsed)| {
            parsed.unwrap_or_else(|e| {
                warn!(row, error = %e, "unreadable csv row");
                RawCostRecord::default()
            })
        })
        .collect();
    let dataset = Dataset::ingest(rows);
    info!(accepted = dataset.len(), rejected = dataset.rejected().len(), "cost export loaded");
    Ok(dataset)
}
