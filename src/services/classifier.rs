//! Vulnerability classification: ingestion checks, severity aggregation, and filtering.

use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;
use crate::models::vulnerability::{
    AffectedItem, RawFinding, Severity, SeverityCounts, Vulnerability,
};

/// Severity selector for finding lists: one bucket or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityFilter {
    All,
    Only(Severity),
}

impl FromStr for SeverityFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Self::All);
        }
        s.parse::<Severity>()
            .map(Self::Only)
            .map_err(|e| AppError::Validation(format!("Invalid severity filter: {e}")))
    }
}

impl fmt::Display for SeverityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(severity) => write!(f, "{severity}"),
        }
    }
}

/// Validate engine output and convert it into typed findings.
///
/// Any unknown severity rejects the whole batch with `InvalidSeverity`; a
/// finding is never dropped or re-bucketed.
pub fn ingest(raw: Vec<RawFinding>) -> Result<Vec<Vulnerability>, AppError> {
    raw.into_iter()
        .enumerate()
        .map(|(index, finding)| ingest_one(index, finding))
        .collect()
}

fn ingest_one(index: usize, raw: RawFinding) -> Result<Vulnerability, AppError> {
    let severity = raw
        .severity
        .parse::<Severity>()
        .map_err(|e| AppError::InvalidSeverity(format!("finding #{index}: {e}")))?;

    for (field, value) in [
        ("title", &raw.title),
        ("description", &raw.description),
        ("recommendation", &raw.recommendation),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "finding #{index}: {field} must not be empty"
            )));
        }
    }

    if let Some(position) = raw.affected_items.iter().position(|item| match item {
        AffectedItem::Identifier(id) => id.trim().is_empty(),
        AffectedItem::Record(record) => !record.has_identity(),
    }) {
        return Err(AppError::Validation(format!(
            "finding #{index}: affected item #{position} has no username, user_dn or server"
        )));
    }

    let item_count = raw.affected_items.len();
    if let Some(count) = raw.count {
        if count != item_count {
            return Err(AppError::Validation(format!(
                "finding #{index}: count {count} does not match {item_count} affected items"
            )));
        }
    }

    Ok(Vulnerability {
        severity,
        title: raw.title,
        description: raw.description,
        recommendation: raw.recommendation,
        cve: raw.cve.filter(|cve| !cve.trim().is_empty()),
        affected_items: raw.affected_items,
        count: item_count,
    })
}

/// Partition findings into the four severity buckets.
pub fn aggregate(findings: &[Vulnerability]) -> SeverityCounts {
    findings.iter().fold(SeverityCounts::default(), |mut counts, f| {
        counts.increment(f.severity);
        counts
    })
}

/// Return the findings matching `filter`, preserving their stored order.
pub fn filter(findings: &[Vulnerability], filter: SeverityFilter) -> Vec<&Vulnerability> {
    findings
        .iter()
        .filter(|f| match filter {
            SeverityFilter::All => true,
            SeverityFilter::Only(severity) => f.severity == severity,
        })
        .collect()
}

/// Findings ordered for display: most urgent first, stored order within a severity.
pub fn display_order(findings: &[Vulnerability]) -> Vec<&Vulnerability> {
    let mut ordered: Vec<&Vulnerability> = findings.iter().collect();
    ordered.sort_by_key(|f| f.severity.rank());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(severity: &str, title: &str) -> RawFinding {
        RawFinding {
            severity: severity.to_string(),
            title: title.to_string(),
            description: format!("{title} description"),
            recommendation: format!("Fix {title}"),
            cve: None,
            affected_items: vec![AffectedItem::server("dc01")],
            count: Some(1),
        }
    }

    fn sample() -> Vec<Vulnerability> {
        ingest(vec![
            raw("low", "a"),
            raw("critical", "b"),
            raw("high", "c"),
            raw("critical", "d"),
            raw("low", "e"),
        ])
        .unwrap()
    }

    #[test]
    fn ingest_accepts_valid_findings() {
        let findings = sample();
        assert_eq!(findings.len(), 5);
        assert_eq!(findings[1].severity, Severity::Critical);
        assert_eq!(findings[1].count, 1);
    }

    #[test]
    fn ingest_rejects_unknown_severity() {
        let err = ingest(vec![raw("high", "ok"), raw("info", "bad")]).unwrap_err();
        match err {
            AppError::InvalidSeverity(msg) => assert!(msg.contains("finding #1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ingest_rejects_uppercase_severity() {
        assert!(matches!(
            ingest(vec![raw("CRITICAL", "x")]),
            Err(AppError::InvalidSeverity(_))
        ));
    }

    #[test]
    fn ingest_rejects_empty_text() {
        let mut finding = raw("high", "x");
        finding.recommendation = "   ".to_string();
        assert!(matches!(ingest(vec![finding]), Err(AppError::Validation(_))));
    }

    #[test]
    fn ingest_rejects_count_mismatch() {
        let mut finding = raw("high", "x");
        finding.count = Some(3);
        assert!(matches!(ingest(vec![finding]), Err(AppError::Validation(_))));
    }

    #[test]
    fn ingest_rejects_record_without_identity() {
        let mut finding = raw("medium", "x");
        finding.affected_items =
            serde_json::from_value(json!([{"policy": "Minimum password length"}])).unwrap();
        finding.count = None;
        assert!(matches!(ingest(vec![finding]), Err(AppError::Validation(_))));
    }

    #[test]
    fn ingest_rejects_record_with_blank_username() {
        let mut finding = raw("medium", "x");
        finding.affected_items = serde_json::from_value(json!([{"username": ""}])).unwrap();
        finding.count = None;
        assert!(matches!(ingest(vec![finding]), Err(AppError::Validation(_))));
    }

    #[test]
    fn ingest_derives_missing_count() {
        let mut finding = raw("medium", "x");
        finding.count = None;
        finding.affected_items.push(AffectedItem::Identifier("jdoe".to_string()));
        let findings = ingest(vec![finding]).unwrap();
        assert_eq!(findings[0].count, 2);
    }

    #[test]
    fn ingest_drops_blank_cve() {
        let mut finding = raw("critical", "x");
        finding.cve = Some(" ".to_string());
        assert_eq!(ingest(vec![finding]).unwrap()[0].cve, None);
    }

    #[test]
    fn aggregate_sums_to_total() {
        let findings = sample();
        let counts = aggregate(&findings);
        assert_eq!(counts.critical, 2);
        assert_eq!(counts.high, 1);
        assert_eq!(counts.medium, 0);
        assert_eq!(counts.low, 2);
        assert_eq!(counts.total(), findings.len() as i64);
    }

    #[test]
    fn filter_all_preserves_order() {
        let findings = sample();
        let titles: Vec<&str> = filter(&findings, SeverityFilter::All)
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        assert_eq!(titles, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn filter_by_severity_is_exact_subsequence() {
        let findings = sample();
        let titles: Vec<&str> = filter(&findings, SeverityFilter::Only(Severity::Critical))
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        assert_eq!(titles, vec!["b", "d"]);
        assert!(filter(&findings, SeverityFilter::Only(Severity::Medium)).is_empty());
    }

    #[test]
    fn display_order_is_stable_by_rank() {
        let findings = sample();
        let titles: Vec<&str> = display_order(&findings)
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        assert_eq!(titles, vec!["b", "d", "c", "a", "e"]);
    }

    #[test]
    fn severity_filter_parsing() {
        assert_eq!("all".parse::<SeverityFilter>().unwrap(), SeverityFilter::All);
        assert_eq!(
            "low".parse::<SeverityFilter>().unwrap(),
            SeverityFilter::Only(Severity::Low)
        );
        assert!("urgent".parse::<SeverityFilter>().is_err());
        assert_eq!(SeverityFilter::Only(Severity::High).to_string(), "high");
    }
}
