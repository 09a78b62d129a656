//! Supplier & Integration Model

use serde::{Deserialize, Serialize};

/// Supplier lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierStatus {
    Active,
    Inactive,
    PendingApproval,
    Suspended,
    Terminated,
}

/// Supplier entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    /// Contact address, used by the email transport when the integration has none
    pub email: Option<String>,
    pub status: SupplierStatus,
    pub created_at: i64,
}

impl Supplier {
    /// Only active suppliers accept new submissions
    pub fn is_active(&self) -> bool {
        self.status == SupplierStatus::Active
    }
}

/// Integration transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    Api,
    Webhook,
    Ftp,
    Email,
    CsvUpload,
    Manual,
}

impl IntegrationType {
    /// Integration types that run without a human in the loop
    pub fn is_automated(&self) -> bool {
        matches!(self, Self::Api | Self::Webhook | Self::Ftp | Self::CsvUpload)
    }

    /// Integration types the catalog sync can pull from
    pub fn supports_catalog_sync(&self) -> bool {
        matches!(self, Self::Api | Self::Ftp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Ftp => "ftp",
            Self::Email => "email",
            Self::CsvUpload => "csv_upload",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FTP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Remote directory for uploads and catalog feeds
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_passive")]
    pub passive: bool,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_passive() -> bool {
    true
}

/// Supplier integration (transport configuration + health counters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierIntegration {
    pub id: i64,
    pub supplier_id: i64,
    pub integration_type: IntegrationType,
    /// Base URL for the api transport (`{endpoint}/orders`, `{endpoint}/products`)
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Bearer token for the api transport; also used to identify inbound webhooks
    #[serde(default)]
    pub api_key: Option<String>,
    /// Target URL for the webhook transport
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// HMAC-SHA256 secret for outbound and inbound webhook signatures
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub ftp: Option<FtpConfig>,
    /// Order inbox for the email transport
    #[serde(default)]
    pub email: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub last_successful_sync: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub updated_at: i64,
}

impl SupplierIntegration {
    pub fn is_automated(&self) -> bool {
        self.integration_type.is_automated()
    }

    /// 记录一次失败 (failure counter +1)
    pub fn record_failure(&mut self, error: impl Into<String>, now: i64) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    /// 记录一次成功 (reset failure counter)
    pub fn record_success(&mut self, now: i64) {
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_successful_sync = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration(kind: IntegrationType) -> SupplierIntegration {
        SupplierIntegration {
            id: 1,
            supplier_id: 1,
            integration_type: kind,
            api_endpoint: None,
            api_key: None,
            webhook_url: None,
            webhook_secret: None,
            ftp: None,
            email: None,
            is_active: true,
            consecutive_failures: 0,
            last_successful_sync: None,
            last_error: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_is_automated() {
        assert!(IntegrationType::Api.is_automated());
        assert!(IntegrationType::Webhook.is_automated());
        assert!(IntegrationType::Ftp.is_automated());
        assert!(IntegrationType::CsvUpload.is_automated());
        assert!(!IntegrationType::Email.is_automated());
        assert!(!IntegrationType::Manual.is_automated());
    }

    #[test]
    fn test_failure_counter() {
        let mut i = integration(IntegrationType::Api);
        i.record_failure("timeout", 10);
        i.record_failure("503", 20);
        assert_eq!(i.consecutive_failures, 2);
        assert_eq!(i.last_error.as_deref(), Some("503"));

        i.record_success(30);
        assert_eq!(i.consecutive_failures, 0);
        assert_eq!(i.last_successful_sync, Some(30));
        assert!(i.last_error.is_none());
    }

    #[test]
    fn test_ftp_defaults() {
        let cfg: FtpConfig =
            serde_json::from_str(r#"{"host":"ftp.acme","username":"u","password":"p"}"#).unwrap();
        assert_eq!(cfg.port, 21);
        assert!(cfg.passive);
        assert!(cfg.directory.is_none());
    }
}
