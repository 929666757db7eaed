//! Scan risk score computation using a weighted severity model.
//!
//! Each finding contributes its severity weight; the sum is clamped to 0-100.
//! Default weights (configurable via `RISK_WEIGHT_*`):
//! - Critical: 25
//! - High: 15
//! - Medium: 7
//! - Low: 3

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::vulnerability::{Severity, SeverityCounts};

/// Upper bound of the risk score.
pub const MAX_SCORE: i64 = 100;

/// Per-finding weight of each severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskWeights {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            critical: 25,
            high: 15,
            medium: 7,
            low: 3,
        }
    }
}

impl RiskWeights {
    pub fn weight(&self, severity: Severity) -> i64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Weights must be positive and strictly decreasing with severity.
    pub fn validate(&self) -> Result<(), String> {
        if self.low <= 0 {
            return Err(format!("low weight must be positive, got {}", self.low));
        }
        if !(self.critical > self.high && self.high > self.medium && self.medium > self.low) {
            return Err(format!(
                "weights must satisfy critical > high > medium > low, got {}/{}/{}/{}",
                self.critical, self.high, self.medium, self.low
            ));
        }
        Ok(())
    }
}

/// Risk band used for display colouring; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Severe,
    Elevated,
    Moderate,
    Low,
}

impl RiskBand {
    /// Map a score to its band: >=75 severe, >=50 elevated, >=25 moderate.
    pub fn from_score(score: i64) -> Self {
        if score >= 75 {
            Self::Severe
        } else if score >= 50 {
            Self::Elevated
        } else if score >= 25 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    /// Hex colour used by the HTML report.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Severe => "#e74c3c",
            Self::Elevated => "#e67e22",
            Self::Moderate => "#f39c12",
            Self::Low => "#27ae60",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Severe => write!(f, "Severe"),
            Self::Elevated => write!(f, "Elevated"),
            Self::Moderate => write!(f, "Moderate"),
            Self::Low => write!(f, "Low"),
        }
    }
}

/// Compute the risk score for a set of severity counts.
pub fn compute(counts: &SeverityCounts, weights: &RiskWeights) -> i64 {
    let raw = Severity::ALL.iter().fold(0i64, |acc, severity| {
        let contribution = counts
            .get(*severity)
            .max(0)
            .saturating_mul(weights.weight(*severity));
        acc.saturating_add(contribution)
    });

    raw.clamp(0, MAX_SCORE)
}
