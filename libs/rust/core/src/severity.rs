//! Severity tiers and the boundary table that assigns them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{positive, METHOD_COUNT};
use crate::error::DetectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self { Severity::Low => "LOW", Severity::Medium => "MEDIUM", Severity::High => "HIGH", Severity::Critical => "CRITICAL" }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Tier boundaries. A verdict gets the highest tier reached by any of the
/// three axes (method count, combined score, absolute deviation), so every
/// anomalous record lands in exactly one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityPolicy {
    pub medium_methods: usize,
    pub high_methods: usize,
    pub critical_methods: usize,
    /// combined_score at or above this is CRITICAL.
    pub critical_score: f64,
    pub high_deviation_pct: f64,
    pub critical_deviation_pct: f64,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self { medium_methods: 2, high_methods: 3, critical_methods: 4, critical_score: 0.95, high_deviation_pct: 100.0, critical_deviation_pct: 200.0 }
    }
}

impl SeverityPolicy {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(1 <= self.medium_methods && self.medium_methods < self.high_methods && self.high_methods < self.critical_methods && self.critical_methods <= METHOD_COUNT) {
            return Err(DetectionError::config(
                "severity.*_methods",
                format!("must satisfy 1 <= medium < high < critical <= {METHOD_COUNT}, got {}/{}/{}", self.medium_methods, self.high_methods, self.critical_methods),
            ));
        }
        if !(self.critical_score > 0.0 && self.critical_score <= 1.0) {
            return Err(DetectionError::config("severity.critical_score", format!("must be in (0, 1], got {}", self.critical_score)));
        }
        positive("severity.high_deviation_pct", self.high_deviation_pct)?;
        positive("severity.critical_deviation_pct", self.critical_deviation_pct)?;
        if self.high_deviation_pct >= self.critical_deviation_pct {
            return Err(DetectionError::config(
                "severity.critical_deviation_pct",
                format!("must exceed high_deviation_pct ({} >= {})", self.high_deviation_pct, self.critical_deviation_pct),
            ));
        }
        Ok(())
    }

    pub fn classify(&self, method_count: usize, combined_score: f64, deviation_pct: f64) -> Severity {
        let by_count = if method_count >= self.critical_methods {
            Severity::Critical
        } else if method_count >= self.high_methods {
            Severity::High
        } else if method_count >= self.medium_methods {
            Severity::Medium
        } else {
            Severity::Low
        };
        let by_score = if combined_score >= self.critical_score { Severity::Critical } else { Severity::Low };
        let dev = deviation_pct.abs();
        let by_deviation = if dev >= self.critical_deviation_pct {
            Severity::Critical
        } else if dev >= self.high_deviation_pct {
            Severity::High
        } else {
            Severity::Low
        };
        by_count.max(by_score).max(by_deviation)
    }
}

/// Vote-weighted score: votes * (votes / METHOD_COUNT).
pub fn severity_score(method_count: usize) -> f64 {
    let n = method_count as f64;
    n * n / METHOD_COUNT as f64
}

pub fn recommendation(severity: Severity, category: &str, amount: f64, deviation_pct: f64) -> String {
    let direction = if deviation_pct >= 0.0 { "spike" } else { "drop" };
    match severity {
        Severity::Critical if deviation_pct < 0.0 => format!(
            "IMMEDIATE ACTION REQUIRED: {category} cost fell to ${amount:.2} ({deviation_pct:+.1}% vs baseline). Verify workloads were not stopped or billing data is not missing."
        ),
        Severity::Critical => format!(
            "IMMEDIATE ACTION REQUIRED: Investigate {category} cost {direction} of ${amount:.2} ({deviation_pct:+.1}% vs baseline). Check for unauthorized usage, misconfigurations, or runaway processes."
        ),
        Severity::High => format!(
            "HIGH PRIORITY: Review {category} costs ({deviation_pct:+.1}% vs baseline). Verify this usage was planned. Consider setting up cost alerts and budget limits."
        ),
        Severity::Medium => format!(
            "REVIEW RECOMMENDED: Monitor {category} for continued cost {direction} ({deviation_pct:+.1}% vs baseline). Document if this is expected seasonal variation."
        ),
        Severity::Low => format!(
            "FYI: Slight variation in {category} costs detected ({deviation_pct:+.1}% vs baseline). No immediate action required but keep monitoring."
        ),
    }
}
