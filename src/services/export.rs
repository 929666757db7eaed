//! Report Exporter: renders a completed scan as text, CSV or HTML.
//!
//! Output depends only on the stored scan, so exporting the same scan twice
//! yields identical bytes.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::models::scan::{Scan, ScanStatus};
use crate::models::vulnerability::{ReportData, Severity, Vulnerability};
use crate::services::classifier;
use crate::services::risk_score::RiskBand;

const RULE: &str = "================================================================================";
const THIN_RULE: &str = "--------------------------------------------------------------------------------";

/// Download format accepted by `GET /api/scans/{id}/download/{format}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Csv,
    Html,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }

    /// `attachment; filename="adsecurecheck_scan_<id>.<ext>"`
    pub fn content_disposition(&self, scan_id: i64) -> String {
        format!(
            "attachment; filename=\"adsecurecheck_scan_{scan_id}.{}\"",
            self.extension()
        )
    }
}

impl FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            other => Err(AppError::Validation(format!(
                "Unsupported report format '{other}', expected text, csv or html"
            ))),
        }
    }
}

/// Render `scan` in `format`. Fails with `NotReady` unless the scan completed.
pub fn export(scan: &Scan, format: ReportFormat) -> Result<Vec<u8>, AppError> {
    let report = match (scan.status, scan.report()) {
        (ScanStatus::Completed, Some(report)) => report,
        (status, _) => {
            return Err(AppError::NotReady(format!(
                "Scan {} is {status}; the report is available once it completes",
                scan.id
            )))
        }
    };

    match format {
        ReportFormat::Text => render_text(scan, report)
            .map(String::into_bytes)
            .map_err(|e| AppError::Internal(format!("Failed to render text report: {e}"))),
        ReportFormat::Csv => render_csv(scan, report),
        ReportFormat::Html => render_html(scan, report)
            .map(String::into_bytes)
            .map_err(|e| AppError::Internal(format!("Failed to render HTML report: {e}"))),
    }
}

/// Strong ETag for a rendered payload.
pub fn etag(payload: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(payload)))
}

/// Escape the five markup-significant characters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn scan_date(scan: &Scan) -> String {
    scan.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn risk_score(scan: &Scan) -> i64 {
    scan.risk_score.unwrap_or(0)
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "CRITICAL",
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
    }
}

// -- Text --

fn render_text(scan: &Scan, report: &ReportData) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let score = risk_score(scan);

    writeln!(out, "{RULE}")?;
    writeln!(out, "ACTIVE DIRECTORY SECURITY AUDIT REPORT")?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "SCAN INFORMATION")?;
    writeln!(out, "{THIN_RULE}")?;
    writeln!(out, "Scan ID: {}", scan.id)?;
    writeln!(out, "Server: {}", scan.ad_server)?;
    writeln!(out, "Domain: {}", scan.ad_domain)?;
    writeln!(out, "Date: {}", scan_date(scan))?;
    if let Some(secs) = report.scan_info.scan_duration_secs {
        writeln!(out, "Duration: {secs:.1}s")?;
    }
    writeln!(out, "Status: {}", scan.status)?;
    writeln!(out)?;
    writeln!(out, "VULNERABILITY SUMMARY")?;
    writeln!(out, "{THIN_RULE}")?;
    writeln!(out, "Risk score: {score}/100 ({})", RiskBand::from_score(score))?;
    writeln!(out, "Total vulnerabilities: {}", scan.total_vulnerabilities)?;
    writeln!(out, "  Critical: {}", scan.critical_count)?;
    writeln!(out, "  High: {}", scan.high_count)?;
    writeln!(out, "  Medium: {}", scan.medium_count)?;
    writeln!(out, "  Low: {}", scan.low_count)?;

    for severity in Severity::ALL {
        let group: Vec<&Vulnerability> = classifier::display_order(&report.vulnerabilities)
            .into_iter()
            .filter(|v| v.severity == severity)
            .collect();
        if group.is_empty() {
            continue;
        }

        let label = severity_label(severity);
        writeln!(out)?;
        writeln!(out, "{RULE}")?;
        writeln!(out, "{label} VULNERABILITIES ({})", group.len())?;
        writeln!(out, "{RULE}")?;

        for (i, vuln) in group.iter().enumerate() {
            writeln!(out)?;
            writeln!(out, "[{label} #{}] {}", i + 1, vuln.title)?;
            writeln!(out, "{THIN_RULE}")?;
            writeln!(out, "Description: {}", vuln.description)?;
            if let Some(cve) = &vuln.cve {
                writeln!(out, "CVE: {cve}")?;
            }
            writeln!(out, "Affected items: {}", vuln.count)?;
            for item in &vuln.affected_items {
                writeln!(out, "  - {}", item.describe())?;
            }
            writeln!(out)?;
            writeln!(out, "Recommendation:")?;
            writeln!(out, "  {}", vuln.recommendation)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "END OF REPORT")?;
    writeln!(out, "{RULE}")?;
    Ok(out)
}

// -- CSV --

fn render_csv(scan: &Scan, report: &ReportData) -> Result<Vec<u8>, AppError> {
    let csv_error = |e: csv::Error| AppError::Internal(format!("Failed to render CSV report: {e}"));

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let metadata = [
        ("scan_id", scan.id.to_string()),
        ("server", scan.ad_server.clone()),
        ("domain", scan.ad_domain.clone()),
        ("date", scan_date(scan)),
        ("risk_score", risk_score(scan).to_string()),
        ("total_vulnerabilities", scan.total_vulnerabilities.to_string()),
        ("critical_count", scan.critical_count.to_string()),
        ("high_count", scan.high_count.to_string()),
        ("medium_count", scan.medium_count.to_string()),
        ("low_count", scan.low_count.to_string()),
    ];
    for (key, value) in &metadata {
        writer.write_record([*key, value.as_str()]).map_err(csv_error)?;
    }

    writer
        .write_record([
            "severity",
            "title",
            "description",
            "cve",
            "affected_count",
            "affected_items",
            "recommendation",
        ])
        .map_err(csv_error)?;

    for vuln in &report.vulnerabilities {
        let affected = vuln
            .affected_items
            .iter()
            .map(|item| item.short_label())
            .collect::<Vec<_>>()
            .join("; ");
        writer
            .write_record([
                vuln.severity.as_str(),
                vuln.title.as_str(),
                vuln.description.as_str(),
                vuln.cve.as_deref().unwrap_or(""),
                vuln.count.to_string().as_str(),
                affected.as_str(),
                vuln.recommendation.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV report: {e}")))
}

// -- HTML --

fn render_html(scan: &Scan, report: &ReportData) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let score = risk_score(scan);
    let band = RiskBand::from_score(score);
    let domain = escape_html(&scan.ad_domain);

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"UTF-8\">")?;
    writeln!(out, "<title>AD security audit - {domain}</title>")?;
    writeln!(out, "<style>")?;
    writeln!(out, "body {{ font-family: Arial, sans-serif; margin: 20px; }}")?;
    writeln!(out, "h1 {{ color: #2c3e50; }}")?;
    writeln!(out, ".critical {{ color: #e74c3c; }}")?;
    writeln!(out, ".high {{ color: #e67e22; }}")?;
    writeln!(out, ".medium {{ color: #f39c12; }}")?;
    writeln!(out, ".low {{ color: #27ae60; }}")?;
    writeln!(out, ".finding {{ border-left: 4px solid #bdc3c7; padding-left: 12px; margin: 16px 0; }}")?;
    writeln!(out, "</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>Active Directory security audit</h1>")?;
    writeln!(out, "<ul>")?;
    writeln!(out, "<li>Scan ID: {}</li>", scan.id)?;
    writeln!(out, "<li>Server: {}</li>", escape_html(&scan.ad_server))?;
    writeln!(out, "<li>Domain: {domain}</li>")?;
    writeln!(out, "<li>Date: {}</li>", scan_date(scan))?;
    writeln!(out, "</ul>")?;
    writeln!(
        out,
        "<h2>Risk score: <span style=\"color: {}\">{score}/100</span> ({band})</h2>",
        band.color()
    )?;
    writeln!(out, "<table>")?;
    writeln!(out, "<tr><td class=\"critical\">Critical</td><td>{}</td></tr>", scan.critical_count)?;
    writeln!(out, "<tr><td class=\"high\">High</td><td>{}</td></tr>", scan.high_count)?;
    writeln!(out, "<tr><td class=\"medium\">Medium</td><td>{}</td></tr>", scan.medium_count)?;
    writeln!(out, "<tr><td class=\"low\">Low</td><td>{}</td></tr>", scan.low_count)?;
    writeln!(out, "<tr><td>Total</td><td>{}</td></tr>", scan.total_vulnerabilities)?;
    writeln!(out, "</table>")?;

    writeln!(out, "<h2>Vulnerabilities</h2>")?;
    for vuln in classifier::display_order(&report.vulnerabilities) {
        let severity = vuln.severity.as_str();
        writeln!(out, "<div class=\"finding\">")?;
        writeln!(
            out,
            "<h3 class=\"{severity}\">[{}] {}</h3>",
            severity_label(vuln.severity),
            escape_html(&vuln.title)
        )?;
        writeln!(out, "<p>{}</p>", escape_html(&vuln.description))?;
        if let Some(cve) = &vuln.cve {
            writeln!(out, "<p>CVE: {}</p>", escape_html(cve))?;
        }
        writeln!(out, "<p>Affected items ({}):</p>", vuln.count)?;
        writeln!(out, "<ul>")?;
        for item in &vuln.affected_items {
            writeln!(out, "<li>{}</li>", escape_html(&item.describe()))?;
        }
        writeln!(out, "</ul>")?;
        writeln!(
            out,
            "<p><strong>Recommendation:</strong> {}</p>",
            escape_html(&vuln.recommendation)
        )?;
        writeln!(out, "</div>")?;
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::types::Json;

    use crate::models::vulnerability::{
        AffectedItem, RawFinding, ReportStatistics, ScanInfo,
    };
    use crate::services::risk_score::{self, RiskWeights};

    fn raw(severity: &str, title: &str, items: Vec<AffectedItem>) -> RawFinding {
        RawFinding {
            severity: severity.to_string(),
            title: title.to_string(),
            description: format!("{title} is misconfigured"),
            recommendation: format!("Harden {title}"),
            cve: None,
            affected_items: items,
            count: None,
        }
    }

    fn completed_scan(findings: Vec<RawFinding>) -> Scan {
        let vulnerabilities = classifier::ingest(findings).unwrap();
        let counts = classifier::aggregate(&vulnerabilities);
        let score = risk_score::compute(&counts, &RiskWeights::default());
        let created = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let report = ReportData {
            scan_info: ScanInfo {
                server: "10.0.0.5".to_string(),
                domain: "corp.local".to_string(),
                scan_start: Some(created),
                scan_end: created,
                scan_duration_secs: Some(0.0),
            },
            statistics: ReportStatistics {
                total_vulnerabilities: counts.total(),
                critical_count: counts.critical,
                high_count: counts.high,
                medium_count: counts.medium,
                low_count: counts.low,
                risk_score: score,
            },
            vulnerabilities,
        };
        Scan {
            id: 42,
            ad_server: "10.0.0.5".to_string(),
            ad_domain: "corp.local".to_string(),
            status: ScanStatus::Completed,
            created_at: created,
            started_at: Some(created),
            completed_at: Some(created),
            total_vulnerabilities: counts.total(),
            critical_count: counts.critical,
            high_count: counts.high,
            medium_count: counts.medium,
            low_count: counts.low,
            risk_score: Some(score),
            report_data: Some(Json(report)),
            failure_reason: None,
        }
    }

    fn sample() -> Scan {
        let mut zerologon = raw(
            "critical",
            "Zerologon",
            vec![AffectedItem::server("dc01.corp.local")],
        );
        zerologon.cve = Some("CVE-2020-1472".to_string());
        completed_scan(vec![
            raw(
                "low",
                "Stale accounts",
                vec![
                    AffectedItem::Identifier("jdoe".to_string()),
                    AffectedItem::Identifier("asmith".to_string()),
                ],
            ),
            zerologon,
            raw(
                "medium",
                "Description, with \"quotes\"\nand newline",
                vec![AffectedItem::Identifier("svc_backup".to_string())],
            ),
        ])
    }

    #[test]
    fn pending_scan_is_not_ready() {
        let mut scan = sample();
        scan.status = ScanStatus::Running;
        scan.report_data = None;
        for format in [ReportFormat::Text, ReportFormat::Csv, ReportFormat::Html] {
            assert!(matches!(export(&scan, format), Err(AppError::NotReady(_))));
        }
    }

    #[test]
    fn exports_are_deterministic() {
        let scan = sample();
        for format in [ReportFormat::Text, ReportFormat::Csv, ReportFormat::Html] {
            let first = export(&scan, format).unwrap();
            let second = export(&scan, format).unwrap();
            assert_eq!(first, second);
            assert_eq!(etag(&first), etag(&second));
        }
    }

    #[test]
    fn text_report_groups_by_severity() {
        let text = String::from_utf8(export(&sample(), ReportFormat::Text).unwrap()).unwrap();
        let critical = text.find("CRITICAL VULNERABILITIES (1)").unwrap();
        let medium = text.find("MEDIUM VULNERABILITIES (1)").unwrap();
        let low = text.find("LOW VULNERABILITIES (1)").unwrap();
        assert!(critical < medium && medium < low);
        assert!(text.contains("Scan ID: 42"));
        assert!(text.contains("Date: 2026-03-14T09:30:00Z"));
        assert!(text.contains("CVE: CVE-2020-1472"));
        assert!(text.contains("  - Server: dc01.corp.local"));
        assert!(text.contains("  - asmith"));
        assert!(!text.contains("HIGH VULNERABILITIES"));
    }

    #[test]
    fn csv_escapes_free_text() {
        let bytes = export(&sample(), ReportFormat::Csv).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("scan_id,42\n"));
        assert!(text.contains("severity,title,description,cve,affected_count,affected_items,recommendation"));
        assert!(text.contains("\"Description, with \"\"quotes\"\"\nand newline\""));
        assert!(text.contains("jdoe; asmith"));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        let findings: Vec<&csv::StringRecord> = rows.iter().filter(|r| r.len() == 7).collect();
        // header plus three findings, in stored order
        assert_eq!(findings.len(), 4);
        assert_eq!(&findings[1][0], "low");
        assert_eq!(&findings[2][3], "CVE-2020-1472");
        assert_eq!(&findings[3][2], "Description, with \"quotes\"\nand newline is misconfigured");
    }

    #[test]
    fn html_escapes_user_text() {
        let mut finding = raw(
            "high",
            "<script>alert('x')</script>",
            vec![AffectedItem::Identifier("a&b".to_string())],
        );
        finding.recommendation = "Use \"quotes\"".to_string();
        let scan = completed_scan(vec![finding]);
        let html = String::from_utf8(export(&scan, ReportFormat::Html).unwrap()).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"));
        assert!(html.contains("<li>a&amp;b</li>"));
        assert!(html.contains("Use &quot;quotes&quot;"));
    }

    #[test]
    fn html_colours_score_by_band() {
        let html = String::from_utf8(export(&sample(), ReportFormat::Html).unwrap()).unwrap();
        // 25 + 7 + 3 = 35 -> moderate
        assert!(html.contains("color: #f39c12\">35/100</span> (Moderate)"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("text".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert_eq!("html".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert!(matches!(
            "pdf".parse::<ReportFormat>(),
            Err(AppError::Validation(_))
        ));
        assert_eq!(
            ReportFormat::Csv.content_disposition(7),
            "attachment; filename=\"adsecurecheck_scan_7.csv\""
        );
    }

    #[test]
    fn etag_is_quoted_sha256() {
        let tag = etag(b"report");
        assert_eq!(tag.len(), 66);
        assert!(tag.starts_with('"') && tag.ends_with('"'));
        assert_ne!(tag, etag(b"report2"));
    }
}
