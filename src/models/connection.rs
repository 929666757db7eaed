//! Connection parameters, scoped credentials, and request DTOs for the
//! directory-facing endpoints.
//!
//! Request types holding a password intentionally do not derive `Debug`.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};
use zeroize::Zeroize;

use crate::errors::AppError;

/// Where to reach the directory service. Safe to log and persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub server: String,
    pub domain: String,
    pub use_ssl: bool,
}

impl ConnectionTarget {
    pub fn port(&self) -> u16 {
        if self.use_ssl {
            636
        } else {
            389
        }
    }

    /// Base DN derived from the DNS domain, e.g. `corp.local` -> `DC=corp,DC=local`.
    pub fn base_dn(&self) -> String {
        self.domain
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| format!("DC={part}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Directory account used for one connection test or one scan.
///
/// Not `Clone`: exactly one owner holds the secret, and dropping it wipes the
/// buffers. `Debug` never prints the password.
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Zeroize for Credentials {
    fn zeroize(&mut self) {
        self.username.zeroize();
        self.password.zeroize();
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Directory facts returned by a successful probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainInfo {
    pub domain_name: String,
    pub base_dn: String,
    pub server: String,
    pub port: u16,
    pub use_ssl: bool,
}

/// Result of a bounded probe; prober faults are folded into `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOutcome {
    Connected(DomainInfo),
    Failed(String),
}

/// Body of `POST /api/ad/test-connection`.
#[derive(Deserialize, Validate)]
pub struct ConnectionTestRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub ad_server: String,
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub ad_domain: String,
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub ad_username: String,
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub ad_password: String,
    pub use_ssl: Option<bool>,
}

impl ConnectionTestRequest {
    /// Validate and split into the loggable target and the scoped credentials.
    pub fn into_parts(self, default_ssl: bool) -> Result<(ConnectionTarget, Credentials), AppError> {
        self.validate().map_err(validation_error)?;
        let target = ConnectionTarget {
            server: self.ad_server.trim().to_string(),
            domain: self.ad_domain.trim().to_string(),
            use_ssl: self.use_ssl.unwrap_or(default_ssl),
        };
        let credentials = Credentials::new(self.ad_username.trim().to_string(), self.ad_password);
        Ok((target, credentials))
    }
}

/// Body of `POST /api/scans/start`.
#[derive(Deserialize, Validate)]
pub struct StartScanRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub connection: ConnectionTestRequest,
    #[serde(default)]
    pub send_email: bool,
    #[validate(email)]
    pub email_to: Option<String>,
}

impl StartScanRequest {
    pub fn into_parts(self, default_ssl: bool) -> Result<(ConnectionTarget, Credentials), AppError> {
        self.validate().map_err(validation_error)?;
        if self.send_email && self.email_to.as_deref().map_or(true, |e| e.trim().is_empty()) {
            return Err(AppError::Validation(
                "email_to is required when send_email is set".to_string(),
            ));
        }
        self.connection.into_parts(default_ssl)
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

/// Flatten validator output into a single message naming every bad field.
fn validation_error(errors: ValidationErrors) -> AppError {
    let mut fields = Vec::new();
    collect_fields(&errors, &mut fields);
    fields.sort();
    AppError::Validation(format!(
        "Missing or invalid fields: {}",
        fields.join(", ")
    ))
}

fn collect_fields(errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        match kind {
            validator::ValidationErrorsKind::Struct(nested) => collect_fields(nested, out),
            _ => out.push(field.to_string()),
        }
    }
}
