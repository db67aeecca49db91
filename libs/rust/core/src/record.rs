//! Cost records and the immutable dataset the scorers read.
//!
//! Raw rows are validated here, at the boundary; nothing downstream sees a
//! missing field or a negative amount.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, RecordError};
use crate::stats::{self, Welford};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    date: NaiveDate,
    category: String,
    amount: f64,
}

impl CostRecord {
    pub fn new(date: NaiveDate, category: impl Into<String>, amount: f64) -> Result<Self, RecordError> {
        let category = category.into();
        if category.trim().is_empty() { return Err(RecordError::MissingField("category")); }
        if !amount.is_finite() { return Err(RecordError::InvalidAmount(amount.to_string())); }
        if amount < 0.0 { return Err(RecordError::NegativeAmount(amount)); }
        Ok(Self { date, category, amount })
    }

    pub fn date(&self) -> NaiveDate { self.date }
    pub fn category(&self) -> &str { &self.category }
    pub fn amount(&self) -> f64 { self.amount }
    /// Monday = 0 .. Sunday = 6
    pub fn weekday(&self) -> u32 { self.date.weekday().num_days_from_monday() }
}

/// Loosely-typed row as handed over by an ingestion collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCostRecord {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "service_name", alias = "service")]
    pub category: Option<String>,
    #[serde(default, alias = "cost_usd", alias = "cost")]
    pub amount: Option<String>,
}

impl RawCostRecord {
    pub fn new(date: &str, category: &str, amount: &str) -> Self {
        Self { date: Some(date.into()), category: Some(category.into()), amount: Some(amount.into()) }
    }
}

impl TryFrom<RawCostRecord> for CostRecord {
    type Error = RecordError;

    fn try_from(raw: RawCostRecord) -> Result<Self, Self::Error> {
        let date = required(raw.date, "date")?;
        let category = required(raw.category, "category")?;
        let amount = required(raw.amount, "amount")?;
        let date = parse_date(&date).ok_or(RecordError::InvalidDate(date))?;
        let amount: f64 = amount.parse().map_err(|_| RecordError::InvalidAmount(amount.clone()))?;
        CostRecord::new(date, category, amount)
    }
}

fn required(field: Option<String>, name: &'static str) -> Result<String, RecordError> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(RecordError::MissingField(name))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .ok()
}

/// Ordered-by-date records plus per-category index partitions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<CostRecord>,
    partitions: BTreeMap<String, Vec<usize>>,
    rejected: Vec<DetectionError>,
}

impl Dataset {
    /// Builds a dataset from already validated records. The sort is stable, so
    /// records sharing a date keep their relative order.
    pub fn from_records(mut records: Vec<CostRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        let mut partitions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, r) in records.iter().enumerate() {
            partitions.entry(r.category.clone()).or_default().push(i);
        }
        Self { records, partitions, rejected: Vec::new() }
    }

    /// Validates raw rows. Rows that fail validation are kept as
    /// `MalformedRecord` rejections (row = zero-based input position) so the
    /// caller can reconcile them against the accepted count.
    pub fn ingest<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = RawCostRecord>,
    {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (row, raw) in rows.into_iter().enumerate() {
            match CostRecord::try_from(raw) {
                Ok(r) => accepted.push(r),
                Err(source) => rejected.push(DetectionError::MalformedRecord { row, source }),
            }
        }
        let mut ds = Self::from_records(accepted);
        ds.rejected = rejected;
        ds
    }

    pub fn records(&self) -> &[CostRecord] { &self.records }
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
    pub fn rejected(&self) -> &[DetectionError] { &self.rejected }
    pub fn rows_received(&self) -> usize { self.records.len() + self.rejected.len() }

    pub fn amounts(&self) -> Vec<f64> { self.records.iter().map(|r| r.amount).collect() }

    /// Category partitions in lexical category order; values are indices into `records()`.
    pub fn partitions(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.partitions.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn partition(&self, category: &str) -> Option<&[usize]> {
        self.partitions.get(category).map(Vec::as_slice)
    }

    pub fn total_cost(&self) -> f64 { self.records.iter().map(|r| r.amount).sum() }

    pub fn stats(&self) -> Option<DatasetStats> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        let amounts = self.amounts();
        let w: Welford = amounts.iter().copied().collect();
        let sorted = stats::sorted(&amounts);
        Some(DatasetStats {
            total_records: self.records.len(),
            total_cost: amounts.iter().sum(),
            average_cost: w.mean(),
            median_cost: stats::percentile(&sorted, 50.0),
            min_cost: sorted[0],
            max_cost: sorted[sorted.len() - 1],
            std_dev: w.std_dev(),
            date_range_start: first.date,
            date_range_end: last.date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub total_cost: f64,
    pub average_cost: f64,
    pub median_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
    pub std_dev: f64,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
}
