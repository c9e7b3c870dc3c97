//! Acceptance scoring for the feedback loop.

use serde::{Deserialize, Serialize};

use crate::core::review::ReviewReport;
use crate::core::types::Severity;

/// Maps a review to an acceptance score in `[0, 1]`.
pub trait ScoringPolicy {
    fn score(&self, report: &ReviewReport) -> f64;
}

/// Default policy: severity-weighted penalty normalized against a baseline.
///
/// `score = 1 - min(1, Σ weight(severity) / baseline)`. A review whose output
/// could not be parsed scores 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    /// Penalty at which the score reaches 0.
    pub baseline: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 1.0,
            high: 0.5,
            medium: 0.2,
            low: 0.05,
            baseline: 4.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let weights = [self.critical, self.high, self.medium, self.low];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            anyhow::bail!("scoring weights must be finite and >= 0");
        }
        if !self.baseline.is_finite() || self.baseline <= 0.0 {
            anyhow::bail!("scoring.baseline must be > 0");
        }
        Ok(())
    }
}

impl ScoringPolicy for SeverityWeights {
    fn score(&self, report: &ReviewReport) -> f64 {
        if !report.parsed {
            return 0.0;
        }
        let penalty: f64 = report
            .items
            .iter()
            .map(|item| self.weight(item.severity))
            .sum();
        (1.0 - (penalty / self.baseline).min(1.0)).clamp(0.0, 1.0)
    }
}
