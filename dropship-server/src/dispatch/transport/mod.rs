//! Submission transports, one variant per integration type

mod api;
mod email;
pub mod ftp;
mod webhook;

pub use api::ApiTransport;
pub use email::EmailTransport;
pub use ftp::{FtpConnector, FtpSession, FtpTransport, InMemoryFtp, SuppaFtpConnector};
pub use webhook::{SIGNATURE_HEADER, WebhookTransport};

use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::payload::OutboundOrderPayload;
use crate::notify::Notifier;
use shared::models::{IntegrationType, Supplier, SupplierIntegration};
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful hand-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Set when the supplier confirmed synchronously
    pub supplier_order_id: Option<String>,
    /// Human-readable summary for the audit note
    pub detail: String,
}

/// Shared clients the transports run on
#[derive(Clone)]
pub struct TransportContext {
    pub http: reqwest::Client,
    pub ftp: Arc<dyn FtpConnector>,
    pub notifier: Arc<dyn Notifier>,
    pub timeout: Duration,
}

impl TransportContext {
    pub fn new(
        timeout: Duration,
        ftp: Arc<dyn FtpConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            http,
            ftp,
            notifier,
            timeout,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Transport {
    Api(ApiTransport),
    Webhook(WebhookTransport),
    Ftp(FtpTransport),
    Email(EmailTransport),
}

fn required(value: &Option<String>, what: &str, integration: &SupplierIntegration) -> EngineResult<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Configuration(format!(
                "{} integration {} has no {what}",
                integration.integration_type, integration.id
            ))
        })
}

impl Transport {
    /// Pick and validate the transport for an integration
    pub fn for_integration(integration: &SupplierIntegration, supplier: &Supplier) -> EngineResult<Self> {
        match integration.integration_type {
            IntegrationType::Api => Ok(Self::Api(ApiTransport {
                endpoint: required(&integration.api_endpoint, "api endpoint", integration)?,
                api_key: required(&integration.api_key, "api key", integration)?,
            })),
            IntegrationType::Webhook => Ok(Self::Webhook(WebhookTransport {
                url: required(&integration.webhook_url, "webhook url", integration)?,
                secret: required(&integration.webhook_secret, "webhook secret", integration)?,
            })),
            IntegrationType::Ftp => integration
                .ftp
                .clone()
                .map(|config| Self::Ftp(FtpTransport { config }))
                .ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "ftp integration {} has no ftp settings",
                        integration.id
                    ))
                }),
            IntegrationType::Email => {
                let recipient = integration.email.clone().or_else(|| supplier.email.clone());
                Ok(Self::Email(EmailTransport {
                    recipient: required(&recipient, "email address", integration)?,
                }))
            }
            IntegrationType::CsvUpload | IntegrationType::Manual => Err(EngineError::Configuration(
                format!(
                    "{} integration {} cannot submit orders",
                    integration.integration_type, integration.id
                ),
            )),
        }
    }

    pub async fn submit(
        &self,
        ctx: &TransportContext,
        payload: &OutboundOrderPayload,
    ) -> EngineResult<SubmissionReceipt> {
        match self {
            Self::Api(t) => t.submit(&ctx.http, payload).await,
            Self::Webhook(t) => t.submit(&ctx.http, payload).await,
            Self::Ftp(t) => t.submit(ctx.ftp.clone(), ctx.timeout, payload).await,
            Self::Email(t) => t.submit(ctx.notifier.clone(), payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::integration;
    use shared::models::SupplierStatus;

    fn supplier() -> Supplier {
        Supplier {
            id: 1,
            name: "Acme".into(),
            email: Some("orders@acme.test".into()),
            status: SupplierStatus::Active,
            created_at: 0,
        }
    }

    #[test]
    fn test_missing_settings_are_configuration_errors() {
        let mut api = integration(1, IntegrationType::Api);
        api.api_endpoint = None;
        assert!(matches!(
            Transport::for_integration(&api, &supplier()),
            Err(EngineError::Configuration(_))
        ));

        let ftp = integration(1, IntegrationType::Ftp);
        assert!(matches!(
            Transport::for_integration(&ftp, &supplier()),
            Err(EngineError::Configuration(_))
        ));

        let manual = integration(1, IntegrationType::Manual);
        assert!(Transport::for_integration(&manual, &supplier()).is_err());
    }

    #[test]
    fn test_email_falls_back_to_supplier_address() {
        let email = integration(1, IntegrationType::Email);
        match Transport::for_integration(&email, &supplier()).unwrap() {
            Transport::Email(t) => assert_eq!(t.recipient, "orders@acme.test"),
            other => panic!("unexpected transport {other:?}"),
        }
    }
}
