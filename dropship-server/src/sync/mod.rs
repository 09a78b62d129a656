//! Product / Price / Stock Sync
//!
//! Pulls a supplier's full catalog over its automated integration (api
//! pagination or the newest FTP CSV) and reconciles it against the stored
//! supplier products in one write transaction. Runs on the `sync` queue,
//! serialised per supplier with the dispatcher's [`SupplierLocks`].

mod fetch;
mod reconcile;

pub use fetch::{Feed, RejectedRow, fetch_api_products, fetch_ftp_products, parse_csv};
pub use reconcile::{Reconciliation, reconcile};

use crate::core::config::SyncConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::SupplierLocks;
use crate::dispatch::transport::FtpConnector;
use crate::events::{EngineEvent, EventBus};
use crate::pricing::PriceChangePolicy;
use crate::queue::JobHandler;
use crate::storage::EngineStorage;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use shared::models::{IntegrationType, ProductSupplierMapping, SupplierIntegration};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One product as a supplier reports it (feed row or webhook body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRecord {
    #[serde(alias = "supplier_sku")]
    pub sku: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Major currency units, e.g. `12.50`
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default, alias = "stock_quantity", alias = "quantity")]
    pub stock: Option<i64>,
}

impl SupplierRecord {
    /// Price in minor units
    pub fn price_minor(&self) -> EngineResult<Option<i64>> {
        let Some(price) = self.price else {
            return Ok(None);
        };
        if price.is_sign_negative() {
            return Err(EngineError::Validation(format!("negative price {price}")));
        }
        (price * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Some)
            .ok_or_else(|| EngineError::Validation(format!("price out of range {price}")))
    }
}

/// Counters of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub supplier_id: i64,
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub stock_updates: usize,
    pub price_updates: usize,
    pub price_holds: usize,
    /// Per-record problems; they never abort the batch
    pub errors: Vec<String>,
    pub finished_at: i64,
}

/// Queue payload for the `sync` queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub supplier_id: i64,
}

#[derive(Clone)]
pub struct SyncEngine {
    storage: EngineStorage,
    events: EventBus,
    locks: SupplierLocks,
    http: reqwest::Client,
    ftp: Arc<dyn FtpConnector>,
    ftp_timeout: Duration,
    policy: PriceChangePolicy,
    config: SyncConfig,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: EngineStorage,
        events: EventBus,
        locks: SupplierLocks,
        bulk_timeout: Duration,
        ftp: Arc<dyn FtpConnector>,
        ftp_timeout: Duration,
        policy: PriceChangePolicy,
        config: SyncConfig,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(bulk_timeout)
            .build()
            .map_err(|e| EngineError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            storage,
            events,
            locks,
            http,
            ftp,
            ftp_timeout,
            policy,
            config,
        })
    }

    /// Active suppliers whose integration can feed a catalog
    pub fn syncable_suppliers(&self) -> EngineResult<Vec<i64>> {
        let mut ids = Vec::new();
        for supplier in self.storage.list_suppliers()? {
            if !supplier.is_active() {
                continue;
            }
            if let Some(integration) = self.storage.active_integration(supplier.id)?
                && integration.integration_type.supports_catalog_sync()
            {
                ids.push(supplier.id);
            }
        }
        Ok(ids)
    }

    pub fn last_report(&self, supplier_id: i64) -> EngineResult<Option<SyncReport>> {
        Ok(self.storage.get_sync_report(supplier_id)?)
    }

    pub async fn sync_supplier(&self, supplier_id: i64) -> EngineResult<SyncReport> {
        let _guard = self.locks.acquire(supplier_id).await;

        let supplier = self
            .storage
            .get_supplier(supplier_id)?
            .ok_or_else(|| EngineError::NotFound(format!("supplier {supplier_id}")))?;
        if !supplier.is_active() {
            return Err(EngineError::SupplierInactive(supplier_id));
        }
        let integration = self.storage.active_integration(supplier_id)?.ok_or_else(|| {
            EngineError::Configuration(format!("supplier {supplier_id} has no active integration"))
        })?;
        if !integration.integration_type.supports_catalog_sync() {
            return Err(EngineError::NotAutomated(
                integration.integration_type.to_string(),
            ));
        }

        match self.run(supplier_id, &integration).await {
            Ok(report) => {
                let now = shared::util::now_millis();
                self.storage
                    .update_integration(integration.id, |i| i.record_success(now))?;
                tracing::info!(
                    supplier_id,
                    found = report.found,
                    created = report.created,
                    updated = report.updated,
                    deactivated = report.deactivated,
                    stock_updates = report.stock_updates,
                    price_updates = report.price_updates,
                    price_holds = report.price_holds,
                    errors = report.errors.len(),
                    "Catalog sync finished"
                );
                self.events.emit(EngineEvent::SyncCompleted {
                    supplier_id,
                    report: report.clone(),
                });
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(supplier_id, error = %err, "Catalog sync failed");
                let message = err.to_string();
                let now = shared::util::now_millis();
                self.storage
                    .update_integration(integration.id, |i| i.record_failure(message, now))?;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        supplier_id: i64,
        integration: &SupplierIntegration,
    ) -> EngineResult<SyncReport> {
        let feed = match integration.integration_type {
            IntegrationType::Api => {
                let (Some(endpoint), Some(api_key)) =
                    (&integration.api_endpoint, &integration.api_key)
                else {
                    return Err(EngineError::Configuration(format!(
                        "api integration {} lacks endpoint or key",
                        integration.id
                    )));
                };
                Some(fetch_api_products(&self.http, endpoint, api_key, &self.config).await?)
            }
            IntegrationType::Ftp => {
                let config = integration.ftp.as_ref().ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "ftp integration {} has no ftp settings",
                        integration.id
                    ))
                })?;
                fetch_ftp_products(self.ftp.clone(), config, self.ftp_timeout).await?
            }
            other => return Err(EngineError::NotAutomated(other.to_string())),
        };

        let now = shared::util::now_millis();
        let Some(feed) = feed else {
            // an empty directory is not an empty catalog
            tracing::warn!(supplier_id, "No product feed found, nothing reconciled");
            let report = SyncReport {
                supplier_id,
                errors: vec!["no product feed found".to_string()],
                finished_at: now,
                ..SyncReport::default()
            };
            self.storage.save_sync_report(supplier_id, &report)?;
            return Ok(report);
        };

        let existing = self.storage.supplier_products_for(supplier_id)?;
        let mut mappings: HashMap<i64, Vec<ProductSupplierMapping>> = HashMap::new();
        for mapping in self.storage.list_mappings()? {
            if mapping.supplier_id == supplier_id {
                mappings
                    .entry(mapping.supplier_product_id)
                    .or_default()
                    .push(mapping);
            }
        }

        let Reconciliation {
            writes,
            events,
            mut report,
        } = reconcile(
            supplier_id,
            &existing,
            &mappings,
            &feed.records,
            &feed.rejected,
            &self.policy,
            now,
        );

        if !writes.is_empty() {
            self.storage.apply_sync_batch(&writes, now)?;
        }
        for event in events {
            self.events.emit(event);
        }
        report.finished_at = now;
        self.storage.save_sync_report(supplier_id, &report)?;
        Ok(report)
    }
}

#[async_trait]
impl JobHandler<SyncJob> for SyncEngine {
    async fn handle(&self, job: &SyncJob) -> EngineResult<()> {
        self.sync_supplier(job.supplier_id).await.map(|_| ())
    }
}
