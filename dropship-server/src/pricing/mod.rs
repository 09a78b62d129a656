//! Supplier price propagation
//!
//! Whenever a supplier product's cost changes (sync or webhook) every active
//! mapping with `auto_update_price` gets its retail price recomputed under
//! its markup rule, unless the swing is extreme:
//!
//! | |change| | Effect |
//! |----------|--------|
//! | >= extreme (25%) | held: `auto_update_price` off, pending change stored |
//! | >= significant (10%) | applied, audit log |
//! | below | applied silently |

mod markup;
mod policy;

pub use markup::retail_price;
pub use policy::{PriceChangeClass, PriceChangePolicy, change_percent, display_percent};

use crate::core::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::queue::JobHandler;
use crate::storage::{CatalogWrite, EngineStorage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{PendingPriceChange, ProductSupplierMapping};

/// What a supplier cost change does to one mapping
#[derive(Debug, Clone, PartialEq)]
pub enum PriceDecision {
    Applied {
        product_id: i64,
        retail_price: i64,
        class: PriceChangeClass,
    },
    /// Mapping with auto updates switched off and the change parked
    Held(ProductSupplierMapping),
    Skipped,
}

/// Decide how a cost change `old_cost -> new_cost` propagates through `mapping`
pub fn propagate(
    mapping: &ProductSupplierMapping,
    old_cost: i64,
    new_cost: i64,
    policy: &PriceChangePolicy,
    now: i64,
) -> PriceDecision {
    if !mapping.is_active || !mapping.auto_update_price || old_cost == new_cost {
        return PriceDecision::Skipped;
    }

    let percent = change_percent(old_cost, new_cost);
    match policy.classify(percent) {
        PriceChangeClass::Extreme => {
            let mut held = mapping.clone();
            held.auto_update_price = false;
            held.pending_price_change = Some(PendingPriceChange {
                old_price: old_cost,
                new_price: new_cost,
                change_percent: display_percent(percent),
                detected_at: now,
            });
            held.updated_at = now;
            PriceDecision::Held(held)
        }
        class => PriceDecision::Applied {
            product_id: mapping.product_id,
            retail_price: retail_price(&mapping.markup, new_cost),
            class,
        },
    }
}

impl PriceDecision {
    /// Catalog writes and events for this decision
    pub fn into_effects(self, mapping_id: i64) -> (Option<CatalogWrite>, Option<EngineEvent>) {
        match self {
            PriceDecision::Applied {
                product_id,
                retail_price,
                class,
            } => {
                if class == PriceChangeClass::Significant {
                    tracing::info!(
                        target: "audit",
                        mapping_id,
                        product_id,
                        retail_price,
                        "Significant supplier price change applied"
                    );
                }
                (
                    Some(CatalogWrite::ProductPrice {
                        product_id,
                        price: retail_price,
                    }),
                    None,
                )
            }
            PriceDecision::Held(mapping) => {
                let event = mapping
                    .pending_price_change
                    .as_ref()
                    .map(|p| EngineEvent::PriceChangeHeld {
                        mapping_id: mapping.id,
                        product_id: mapping.product_id,
                        old_price: p.old_price,
                        new_price: p.new_price,
                        change_percent: p.change_percent,
                    });
                tracing::warn!(
                    mapping_id = mapping.id,
                    product_id = mapping.product_id,
                    "Extreme supplier price change held for approval"
                );
                (Some(CatalogWrite::Mapping(mapping)), event)
            }
            PriceDecision::Skipped => (None, None),
        }
    }
}

/// Supplier product price moved; reprice its mappings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingJob {
    pub supplier_product_id: i64,
    pub old_price: i64,
    pub new_price: i64,
}

#[derive(Clone)]
pub struct PriceService {
    storage: EngineStorage,
    events: EventBus,
    policy: PriceChangePolicy,
}

impl PriceService {
    pub fn new(storage: EngineStorage, events: EventBus, policy: PriceChangePolicy) -> Self {
        Self {
            storage,
            events,
            policy,
        }
    }

    pub fn policy(&self) -> &PriceChangePolicy {
        &self.policy
    }

    /// Propagate one cost change to every mapping of the supplier product
    pub fn reprice(&self, job: &PricingJob) -> EngineResult<Vec<PriceDecision>> {
        let now = shared::util::now_millis();
        let mappings = self
            .storage
            .mappings_for_supplier_product(job.supplier_product_id)?;

        let decisions: Vec<(i64, PriceDecision)> = mappings
            .iter()
            .map(|m| (m.id, propagate(m, job.old_price, job.new_price, &self.policy, now)))
            .collect();

        let mut writes = Vec::new();
        let mut events = Vec::new();
        for (mapping_id, decision) in decisions.iter().cloned() {
            let (write, event) = decision.into_effects(mapping_id);
            writes.extend(write);
            events.extend(event);
        }
        if !writes.is_empty() {
            self.storage.apply_sync_batch(&writes, now)?;
        }
        for event in events {
            self.events.emit(event);
        }
        Ok(decisions.into_iter().map(|(_, d)| d).collect())
    }

    pub fn pending_changes(&self) -> EngineResult<Vec<ProductSupplierMapping>> {
        Ok(self.storage.mappings_with_pending_price()?)
    }

    /// Apply a held change and resume automatic price updates
    pub fn approve(&self, mapping_id: i64) -> EngineResult<ProductSupplierMapping> {
        let now = shared::util::now_millis();
        let mut mapping = self.load(mapping_id)?;
        let pending = mapping
            .pending_price_change
            .take()
            .ok_or(EngineError::NoPendingPriceChange(mapping_id))?;

        let price = retail_price(&mapping.markup, pending.new_price);
        mapping.auto_update_price = true;
        mapping.updated_at = now;
        self.storage.apply_sync_batch(
            &[
                CatalogWrite::Mapping(mapping.clone()),
                CatalogWrite::ProductPrice {
                    product_id: mapping.product_id,
                    price,
                },
            ],
            now,
        )?;
        tracing::info!(
            target: "audit",
            mapping_id,
            product_id = mapping.product_id,
            retail_price = price,
            "Held price change approved"
        );
        Ok(mapping)
    }

    /// Discard a held change. The retail price stays as it was and automatic
    /// updates stay off until re-enabled on the mapping.
    pub fn reject(&self, mapping_id: i64) -> EngineResult<ProductSupplierMapping> {
        let mapping = self.load(mapping_id)?;
        if mapping.pending_price_change.is_none() {
            return Err(EngineError::NoPendingPriceChange(mapping_id));
        }
        let now = shared::util::now_millis();
        let mapping = self.storage.update_mapping(mapping_id, |m| {
            m.pending_price_change = None;
            m.updated_at = now;
        })?;
        tracing::info!(target: "audit", mapping_id, "Held price change rejected");
        Ok(mapping)
    }

    /// Manual cost entry for suppliers without an automated feed. Stores the
    /// new cost and returns the repricing job for the `pricing` queue, or
    /// `None` when the cost did not move.
    pub fn set_supplier_cost(
        &self,
        supplier_product_id: i64,
        new_price: i64,
    ) -> EngineResult<Option<PricingJob>> {
        if new_price < 0 {
            return Err(EngineError::Validation(format!(
                "negative cost {new_price}"
            )));
        }
        let mut product = self
            .storage
            .get_supplier_product(supplier_product_id)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("supplier product {supplier_product_id}"))
            })?;
        if product.price == new_price {
            return Ok(None);
        }

        let now = shared::util::now_millis();
        let old_price = product.price;
        product.price = new_price;
        product.updated_at = now;
        self.storage
            .apply_sync_batch(&[CatalogWrite::SupplierProduct(product)], now)?;
        tracing::info!(
            target: "audit",
            supplier_product_id,
            old_price,
            new_price,
            "Supplier cost set manually"
        );
        Ok(Some(PricingJob {
            supplier_product_id,
            old_price,
            new_price,
        }))
    }

    fn load(&self, mapping_id: i64) -> EngineResult<ProductSupplierMapping> {
        self.storage
            .get_mapping(mapping_id)?
            .ok_or_else(|| EngineError::NotFound(format!("mapping {mapping_id}")))
    }
}

#[async_trait]
impl JobHandler<PricingJob> for PriceService {
    async fn handle(&self, job: &PricingJob) -> EngineResult<()> {
        self.reprice(job).map(|_| ())
    }
}
