//! Vulnerability findings embedded in a scan report.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Severity --

/// Closed severity taxonomy, declared in decreasing urgency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most urgent first.
    pub const ALL: [Severity; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Display rank: lower is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Strict parse: only the four lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!(
                "'{other}' is not one of critical, high, medium, low"
            )),
        }
    }
}

// -- Affected items --

/// Structured affected item reported by the scanning engine.
///
/// At least one of `username`, `user_dn` or `server` must be set; any other
/// attributes (group, last_logon, ...) are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffectedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AffectedRecord {
    pub fn has_identity(&self) -> bool {
        self.identity().is_some()
    }

    /// First non-blank of username, user_dn and server.
    pub fn identity(&self) -> Option<&str> {
        non_blank(&self.username)
            .or_else(|| non_blank(&self.user_dn))
            .or_else(|| non_blank(&self.server))
    }

    /// String value of an extra attribute, if present.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One object affected by a finding: a bare identifier or a structured record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AffectedItem {
    Identifier(String),
    Record(AffectedRecord),
}

impl AffectedItem {
    pub fn server(server: &str) -> Self {
        Self::Record(AffectedRecord {
            username: None,
            user_dn: None,
            server: Some(server.to_string()),
            extra: serde_json::Map::new(),
        })
    }

    /// Short form used in single-line contexts (CSV cells).
    pub fn short_label(&self) -> String {
        match self {
            Self::Identifier(id) => id.clone(),
            Self::Record(r) => r.identity().unwrap_or_default().to_string(),
        }
    }

    /// Human-readable description used in text and HTML reports.
    pub fn describe(&self) -> String {
        let record = match self {
            Self::Identifier(id) => return id.clone(),
            Self::Record(r) => r,
        };

        if let Some(user) = non_blank(&record.username) {
            let mut line = format!("User: {user}");
            if let Some(group) = record.extra_str("group") {
                line.push_str(&format!(" | Group: {group}"));
            }
            if let Some(last_logon) = record.extra_str("last_logon") {
                line.push_str(&format!(" | Last logon: {last_logon}"));
            }
            if let Some(status) = record
                .extra_str("status")
                .or_else(|| record.extra_str("reason"))
            {
                line.push_str(&format!(" | Status: {status}"));
            }
            line
        } else if let Some(dn) = non_blank(&record.user_dn) {
            let group = record.extra_str("group").unwrap_or_else(|| "N/A".to_string());
            format!("User: {} | Privileged group: {group}", common_name(dn))
        } else if let Some(server) = non_blank(&record.server) {
            format!("Server: {server}")
        } else {
            String::new()
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Extract the leading CN component of a distinguished name.
fn common_name(dn: &str) -> &str {
    let first = dn.split(',').next().unwrap_or(dn).trim();
    first
        .strip_prefix("CN=")
        .or_else(|| first.strip_prefix("cn="))
        .unwrap_or(first)
}

// -- Findings --

/// A finding as emitted by the scanning engine, before ingestion checks.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawFinding {
    pub severity: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default)]
    pub cve: Option<String>,
    #[serde(default)]
    pub affected_items: Vec<AffectedItem>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// A validated finding owned by its scan's report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vulnerability {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default)]
    pub affected_items: Vec<AffectedItem>,
    pub count: usize,
}

// -- Report --

/// Finding counts per severity bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeverityCounts {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl SeverityCounts {
    pub fn total(&self) -> i64 {
        self.critical + self.high + self.medium + self.low
    }

    pub fn get(&self, severity: Severity) -> i64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

/// Summary statistics stored alongside the findings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportStatistics {
    pub total_vulnerabilities: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub risk_score: i64,
}

/// Target and timing metadata of the run that produced the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanInfo {
    pub server: String,
    pub domain: String,
    pub scan_start: Option<DateTime<Utc>>,
    pub scan_end: DateTime<Utc>,
    pub scan_duration_secs: Option<f64>,
}

/// Full report embedded in a completed scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportData {
    pub scan_info: ScanInfo,
    pub statistics: ReportStatistics,
    pub vulnerabilities: Vec<Vulnerability>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_serialization() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn severity_parse_is_strict() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert!("HIGH".parse::<Severity>().is_err());
        assert!("info".parse::<Severity>().is_err());
        assert!("".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::High.rank() < Severity::Medium.rank());
        assert!(Severity::Medium.rank() < Severity::Low.rank());
    }

    #[test]
    fn affected_item_accepts_string_or_record() {
        let items: Vec<AffectedItem> = serde_json::from_value(json!([
            "DC01",
            {"username": "jdoe", "last_logon": "2024-01-01"},
            {"user_dn": "CN=Alice,OU=Admins,DC=corp,DC=local", "group": "Domain Admins"}
        ]))
        .unwrap();

        assert_eq!(items[0], AffectedItem::Identifier("DC01".to_string()));
        assert_eq!(
            items[1].describe(),
            "User: jdoe | Last logon: 2024-01-01"
        );
        assert_eq!(
            items[2].describe(),
            "User: Alice | Privileged group: Domain Admins"
        );
        assert_eq!(items[2].short_label(), "CN=Alice,OU=Admins,DC=corp,DC=local");
    }

    #[test]
    fn record_without_identity_is_detected() {
        let item: AffectedItem =
            serde_json::from_value(json!({"policy": "Minimum password length"})).unwrap();
        match item {
            AffectedItem::Record(r) => assert!(!r.has_identity()),
            AffectedItem::Identifier(_) => panic!("expected a record"),
        }
    }

    #[test]
    fn blank_identity_fields_do_not_count() {
        let item: AffectedItem = serde_json::from_value(json!({"username": "  "})).unwrap();
        match &item {
            AffectedItem::Record(r) => assert!(!r.has_identity()),
            AffectedItem::Identifier(_) => panic!("expected a record"),
        }

        let item: AffectedItem =
            serde_json::from_value(json!({"username": "", "server": "dc01"})).unwrap();
        assert_eq!(item.describe(), "Server: dc01");
        assert_eq!(item.short_label(), "dc01");
    }

    #[test]
    fn server_item_description() {
        assert_eq!(AffectedItem::server("10.0.0.5").describe(), "Server: 10.0.0.5");
    }

    #[test]
    fn counts_total_and_increment() {
        let mut counts = SeverityCounts::default();
        counts.increment(Severity::Critical);
        counts.increment(Severity::Low);
        counts.increment(Severity::Low);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(Severity::Low), 2);
        assert_eq!(counts.get(Severity::Medium), 0);
    }
}
