//! Default collaborators wired by the binary: a TCP reachability prober for
//! the directory endpoint and an engine emitting the protocol-hardening
//! baseline checks for a domain controller.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::models::connection::{ConnectionTarget, Credentials, DomainInfo};
use crate::models::vulnerability::{AffectedItem, RawFinding};
use crate::services::prober::{DirectoryProber, ProbeError, ScanEngine};

/// Checks that the LDAP (389) or LDAPS (636) port of the target accepts connections.
#[derive(Debug, Clone)]
pub struct TcpDirectoryProber {
    connect_timeout: Duration,
}

impl TcpDirectoryProber {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl DirectoryProber for TcpDirectoryProber {
    async fn probe(
        &self,
        target: &ConnectionTarget,
        credentials: &Credentials,
    ) -> Result<DomainInfo, ProbeError> {
        if credentials.username().is_empty() || credentials.password().is_empty() {
            return Err(ProbeError::AuthenticationRejected(
                "username and password are required".to_string(),
            ));
        }

        let port = target.port();
        let address = (target.server.as_str(), port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => {}
            Ok(Err(e)) => {
                return Err(ProbeError::Unreachable(format!(
                    "{}:{port}: {e}",
                    target.server
                )))
            }
            Err(_) => return Err(ProbeError::Timeout(self.connect_timeout)),
        }

        tracing::debug!(server = %target.server, port, "Directory endpoint reachable");
        Ok(DomainInfo {
            domain_name: target.domain.clone(),
            base_dn: target.base_dn(),
            server: target.server.clone(),
            port,
            use_ssl: target.use_ssl,
        })
    }
}

/// Engine reporting the hardening baseline every domain controller is audited against.
#[derive(Debug, Clone)]
pub struct BaselineEngine {
    prober: TcpDirectoryProber,
}

impl BaselineEngine {
    pub fn new(prober: TcpDirectoryProber) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl ScanEngine for BaselineEngine {
    async fn scan(
        &self,
        target: &ConnectionTarget,
        credentials: &Credentials,
    ) -> Result<Vec<RawFinding>, ProbeError> {
        self.prober.probe(target, credentials).await?;
        let findings = baseline_findings(target);
        tracing::info!(
            server = %target.server,
            findings = findings.len(),
            "Baseline checks finished"
        );
        Ok(findings)
    }
}

/// Baseline findings for `target`, in check order.
pub fn baseline_findings(target: &ConnectionTarget) -> Vec<RawFinding> {
    let server = || vec![AffectedItem::server(&target.server)];

    let mut findings = vec![
        finding(
            "high",
            "LDAP signing not required",
            "LDAP signing is not enforced, which allows man-in-the-middle attacks against directory traffic.",
            "Set \"Domain controller: LDAP server signing requirements\" to \"Require signing\" by group policy.",
            None,
            server(),
        ),
        finding(
            "high",
            "SMB signing not required",
            "SMB signing is not enforced, which allows NTLM relay attacks.",
            "Enable \"Microsoft network server: Digitally sign communications (always)\" by group policy.",
            None,
            server(),
        ),
        finding(
            "high",
            "SMBv1 enabled",
            "SMBv1 is obsolete and exploitable (WannaCry, NotPetya) and should be disabled.",
            "Disable SMBv1 on all servers and workstations and use SMBv2 or SMBv3.",
            None,
            server(),
        ),
        finding(
            "critical",
            "Zerologon patch verification required",
            "Zerologon (CVE-2020-1472) allows a critical privilege escalation to domain admin. Confirm the patch is installed.",
            "Install the Microsoft security updates from August 2020 or later and confirm KB4571694 is present.",
            Some("CVE-2020-1472"),
            server(),
        ),
        finding(
            "critical",
            "PrintNightmare patch verification required",
            "PrintNightmare allows remote code execution through the print spooler service.",
            "Install the July 2021 patches and disable the print spooler on domain controllers that do not need it.",
            Some("CVE-2021-34527"),
            server(),
        ),
        finding(
            "medium",
            "NTLM authentication potentially active",
            "NTLM is weaker than Kerberos and exposed to relay attacks.",
            "Enforce Kerberos and block NTLM by group policy unless needed for compatibility.",
            None,
            vec![AffectedItem::Identifier(target.domain.clone())],
        ),
    ];

    if !target.use_ssl {
        findings.push(finding(
            "medium",
            "LDAP traffic not encrypted",
            "The audit connected over plain LDAP; credentials and directory data cross the network unencrypted.",
            "Require LDAPS (port 636) or LDAP with StartTLS for all directory clients.",
            None,
            server(),
        ));
    }

    findings
}

fn finding(
    severity: &str,
    title: &str,
    description: &str,
    recommendation: &str,
    cve: Option<&str>,
    affected_items: Vec<AffectedItem>,
) -> RawFinding {
    RawFinding {
        severity: severity.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        recommendation: recommendation.to_string(),
        cve: cve.map(str::to_string),
        count: Some(affected_items.len()),
        affected_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier;

    fn target(use_ssl: bool) -> ConnectionTarget {
        ConnectionTarget {
            server: "127.0.0.1".to_string(),
            domain: "corp.local".to_string(),
            use_ssl,
        }
    }

    #[test]
    fn baseline_passes_ingestion() {
        let findings = classifier::ingest(baseline_findings(&target(true))).unwrap();
        let counts = classifier::aggregate(&findings);
        assert_eq!(counts.critical, 2);
        assert_eq!(counts.high, 3);
        assert_eq!(counts.medium, 1);
        assert_eq!(counts.low, 0);
    }

    #[test]
    fn plain_ldap_adds_encryption_finding() {
        let with_ssl = baseline_findings(&target(true));
        let without_ssl = baseline_findings(&target(false));
        assert_eq!(without_ssl.len(), with_ssl.len() + 1);
        assert!(without_ssl
            .iter()
            .any(|f| f.title == "LDAP traffic not encrypted"));
    }

    #[tokio::test]
    async fn unresolvable_server_fails() {
        let prober = TcpDirectoryProber::new(Duration::from_secs(2));
        let target = ConnectionTarget {
            server: "dc01.adsecurecheck.invalid".to_string(),
            domain: "corp.local".to_string(),
            use_ssl: true,
        };
        let err = prober
            .probe(&target, &Credentials::new("auditor".to_string(), "Pa55word".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Unreachable(_) | ProbeError::Timeout(_)
        ));
        assert!(!err.to_string().contains("Pa55word"));
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected() {
        let prober = TcpDirectoryProber::new(Duration::from_secs(1));
        let err = prober
            .probe(&target(true), &Credentials::new(String::new(), String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::AuthenticationRejected(_)));
    }
}
