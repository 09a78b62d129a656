//! Catalog diffing shared by feed reconciliation and product webhooks
//!
//! Pure: takes the stored rows, returns the writes, events and counters. The
//! caller commits `writes` in one transaction.

use super::{RejectedRow, SupplierRecord, SyncReport};
use crate::events::EngineEvent;
use crate::pricing::{PriceChangePolicy, PriceDecision, propagate};
use crate::storage::CatalogWrite;
use shared::models::{ProductSupplierMapping, SupplierProduct, SyncStatus};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub writes: Vec<CatalogWrite>,
    pub events: Vec<EngineEvent>,
    pub report: SyncReport,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Create or update one supplier product from an incoming record.
    ///
    /// Fields absent from the record are left alone; present fields are
    /// written only when they differ. Price changes go through
    /// [`propagate`], stock changes cascade to mappings with
    /// `auto_update_stock`.
    pub fn apply_record(
        &mut self,
        supplier_id: i64,
        existing: Option<&SupplierProduct>,
        mappings: &[ProductSupplierMapping],
        record: &SupplierRecord,
        policy: &PriceChangePolicy,
        now: i64,
    ) {
        let sku = record.sku.trim();
        let price = match record.price_minor() {
            Ok(price) => price,
            Err(e) => {
                self.report.errors.push(format!("{sku}: {e}"));
                return;
            }
        };
        if record.stock.is_some_and(|s| s < 0) {
            self.report.errors.push(format!("{sku}: negative stock"));
            return;
        }

        let Some(existing) = existing else {
            let Some(price) = price else {
                self.report
                    .errors
                    .push(format!("{sku}: new product without price"));
                return;
            };
            self.writes.push(CatalogWrite::SupplierProduct(SupplierProduct {
                id: 0,
                supplier_id,
                supplier_sku: sku.to_string(),
                name: record.name.clone().unwrap_or_else(|| sku.to_string()),
                price,
                stock_quantity: record.stock.unwrap_or(0),
                sync_status: SyncStatus::Synced,
                is_active: true,
                last_synced_at: Some(now),
                updated_at: now,
            }));
            self.report.created += 1;
            return;
        };

        let mut next = existing.clone();
        let mut changed = false;

        if let Some(name) = &record.name
            && *name != existing.name
        {
            next.name = name.clone();
            changed = true;
        }
        if !existing.is_active || existing.sync_status != SyncStatus::Synced {
            next.is_active = true;
            next.sync_status = SyncStatus::Synced;
            changed = true;
        }
        if let Some(price) = price
            && price != existing.price
        {
            next.price = price;
            changed = true;
            self.report.price_updates += 1;
            for mapping in mappings {
                let decision = propagate(mapping, existing.price, price, policy, now);
                if matches!(decision, PriceDecision::Held(_)) {
                    self.report.price_holds += 1;
                }
                let (write, event) = decision.into_effects(mapping.id);
                self.writes.extend(write);
                self.events.extend(event);
            }
        }
        if let Some(stock) = record.stock
            && stock != existing.stock_quantity
        {
            next.stock_quantity = stock;
            changed = true;
            self.report.stock_updates += 1;
            for mapping in mappings
                .iter()
                .filter(|m| m.is_active && m.auto_update_stock)
            {
                self.writes.push(CatalogWrite::ProductStock {
                    product_id: mapping.product_id,
                    stock,
                });
            }
        }

        if changed {
            next.last_synced_at = Some(now);
            next.updated_at = now;
            self.writes.push(CatalogWrite::SupplierProduct(next));
            self.report.updated += 1;
        }
    }

    /// Mark a product the supplier no longer lists
    pub fn deactivate(&mut self, product: &SupplierProduct, now: i64) {
        if !product.is_active && product.sync_status == SyncStatus::SupplierDiscontinued {
            return;
        }
        let mut next = product.clone();
        next.is_active = false;
        next.sync_status = SyncStatus::SupplierDiscontinued;
        next.updated_at = now;
        self.writes.push(CatalogWrite::SupplierProduct(next));
        self.report.deactivated += 1;
    }
}

/// Reconcile a full feed against the supplier's stored catalog.
///
/// SKUs missing from the feed are deactivated. A SKU repeated within the
/// feed is applied once and the repeat recorded as an error. Rejected rows
/// are reported; a SKU they still name keeps its stored product untouched.
pub fn reconcile(
    supplier_id: i64,
    existing: &[SupplierProduct],
    mappings: &HashMap<i64, Vec<ProductSupplierMapping>>,
    records: &[SupplierRecord],
    rejected: &[RejectedRow],
    policy: &PriceChangePolicy,
    now: i64,
) -> Reconciliation {
    let by_sku: HashMap<&str, &SupplierProduct> = existing
        .iter()
        .map(|p| (p.supplier_sku.as_str(), p))
        .collect();

    let mut out = Reconciliation::default();
    out.report.supplier_id = supplier_id;
    out.report.found = records.len() + rejected.len();

    let mut unreadable: HashSet<&str> = HashSet::new();
    for row in rejected {
        match &row.sku {
            Some(sku) => {
                out.report.errors.push(format!("{sku}: {}", row.error));
                unreadable.insert(sku.as_str());
            }
            None => out.report.errors.push(row.error.clone()),
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        let sku = record.sku.trim();
        if sku.is_empty() {
            out.report.errors.push("record without sku".to_string());
            continue;
        }
        if !seen.insert(sku) {
            out.report.errors.push(format!("{sku}: duplicate in feed"));
            continue;
        }
        let current = by_sku.get(sku).copied();
        let product_mappings = current
            .and_then(|p| mappings.get(&p.id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        out.apply_record(supplier_id, current, product_mappings, record, policy, now);
    }

    for product in existing {
        let sku = product.supplier_sku.as_str();
        if !seen.contains(sku) && !unreadable.contains(sku) {
            out.deactivate(product, now);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::MarkupRule;

    fn stored(id: i64, sku: &str, price: i64, stock: i64) -> SupplierProduct {
        SupplierProduct {
            id,
            supplier_id: 1,
            supplier_sku: sku.into(),
            name: format!("Item {sku}"),
            price,
            stock_quantity: stock,
            sync_status: SyncStatus::Synced,
            is_active: true,
            last_synced_at: None,
            updated_at: 0,
        }
    }

    fn record(sku: &str, price: Option<i64>, stock: Option<i64>) -> SupplierRecord {
        SupplierRecord {
            sku: sku.into(),
            name: None,
            price: price.map(|p| Decimal::new(p, 2)),
            stock,
        }
    }

    fn mapping(id: i64, supplier_product_id: i64, product_id: i64) -> ProductSupplierMapping {
        ProductSupplierMapping {
            id,
            product_id,
            supplier_product_id,
            supplier_id: 1,
            markup: MarkupRule::Fixed { amount: 500 },
            auto_update_price: true,
            auto_update_stock: true,
            is_active: true,
            pending_price_change: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_absent_sku_is_discontinued() {
        let existing = vec![stored(1, "A", 1000, 5), stored(2, "B", 1000, 5)];
        let out = reconcile(
            1,
            &existing,
            &HashMap::new(),
            &[record("A", Some(1000), Some(5))],
            &[],
            &PriceChangePolicy::default(),
            10,
        );

        assert_eq!(out.report.found, 1);
        assert_eq!(out.report.deactivated, 1);
        assert_eq!(out.report.updated, 0);
        match out.writes.as_slice() {
            [CatalogWrite::SupplierProduct(p)] => {
                assert_eq!(p.supplier_sku, "B");
                assert!(!p.is_active);
                assert_eq!(p.sync_status, SyncStatus::SupplierDiscontinued);
            }
            other => panic!("unexpected writes {other:?}"),
        }
    }

    #[test]
    fn test_changes_cascade_to_mappings() {
        let existing = vec![stored(1, "A", 1000, 5)];
        let mappings = HashMap::from([(1, vec![mapping(7, 1, 42)])]);
        let out = reconcile(
            1,
            &existing,
            &mappings,
            &[record("A", Some(1080), Some(9)), record("NEW", Some(250), None)],
            &[],
            &PriceChangePolicy::default(),
            10,
        );

        assert_eq!(out.report.created, 1);
        assert_eq!(out.report.updated, 1);
        assert_eq!(out.report.price_updates, 1);
        assert_eq!(out.report.stock_updates, 1);
        assert!(out.writes.iter().any(|w| matches!(
            w,
            CatalogWrite::ProductPrice { product_id: 42, price: 1580 }
        )));
        assert!(out.writes.iter().any(|w| matches!(
            w,
            CatalogWrite::ProductStock { product_id: 42, stock: 9 }
        )));
    }

    #[test]
    fn test_extreme_swing_is_held() {
        let existing = vec![stored(1, "A", 1000, 5)];
        let mappings = HashMap::from([(1, vec![mapping(7, 1, 42)])]);
        let out = reconcile(
            1,
            &existing,
            &mappings,
            &[record("A", Some(1300), None)],
            &[],
            &PriceChangePolicy::default(),
            10,
        );

        assert_eq!(out.report.price_holds, 1);
        assert!(!out
            .writes
            .iter()
            .any(|w| matches!(w, CatalogWrite::ProductPrice { .. })));
        assert!(matches!(
            out.events.as_slice(),
            [EngineEvent::PriceChangeHeld { mapping_id: 7, .. }]
        ));
    }

    #[test]
    fn test_bad_records_are_collected() {
        let out = reconcile(
            1,
            &[],
            &HashMap::new(),
            &[
                record("A", Some(100), None),
                record("A", Some(100), None),
                record("B", None, Some(3)),
                record("C", Some(100), Some(-1)),
            ],
            &[],
            &PriceChangePolicy::default(),
            10,
        );
        assert_eq!(out.report.created, 1);
        assert_eq!(out.report.errors.len(), 3);
    }

    #[test]
    fn test_unreadable_row_keeps_its_product() {
        let existing = vec![stored(1, "A", 100, 5), stored(2, "B", 100, 5), stored(3, "C", 100, 5)];
        let rejected = vec![
            RejectedRow {
                sku: Some("B".into()),
                error: "feed row 3: invalid price".into(),
            },
            RejectedRow {
                sku: None,
                error: "feed row 5: found record with 1 field".into(),
            },
        ];
        let out = reconcile(
            1,
            &existing,
            &HashMap::new(),
            &[record("A", Some(100), Some(5))],
            &rejected,
            &PriceChangePolicy::default(),
            10,
        );

        assert_eq!(out.report.found, 3);
        assert_eq!(out.report.deactivated, 1);
        assert_eq!(
            out.report.errors,
            ["B: feed row 3: invalid price", "feed row 5: found record with 1 field"]
        );
        match out.writes.as_slice() {
            [CatalogWrite::SupplierProduct(p)] => assert_eq!(p.supplier_sku, "C"),
            other => panic!("unexpected writes {other:?}"),
        }
    }

    #[test]
    fn test_new_product_is_stored_under_trimmed_sku() {
        let out = reconcile(
            1,
            &[],
            &HashMap::new(),
            &[record("  NEW-1 ", Some(250), Some(2))],
            &[],
            &PriceChangePolicy::default(),
            10,
        );
        match out.writes.as_slice() {
            [CatalogWrite::SupplierProduct(p)] => {
                assert_eq!(p.supplier_sku, "NEW-1");
                assert_eq!(p.name, "NEW-1");
            }
            other => panic!("unexpected writes {other:?}"),
        }
    }
}
