//! Stock effects of terminal dropship transitions
//!
//! - delivered: the shipped quantity is consumed from the supplier product
//! - cancelled: the quantity goes back to the retail product (never virtual)

use crate::core::error::EngineResult;
use crate::events::EngineEvent;
use crate::storage::{EngineStorage, StockAdjustment};
use shared::models::{DropshipOrder, DropshipStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct InventoryHandler {
    storage: EngineStorage,
}

impl InventoryHandler {
    pub fn new(storage: EngineStorage) -> Self {
        Self { storage }
    }

    /// Apply the stock movement for one event; returns the number of
    /// adjustments written.
    pub fn apply(&self, event: &EngineEvent) -> EngineResult<usize> {
        let EngineEvent::DropshipStatusChanged {
            dropship_order_id,
            to,
            ..
        } = event
        else {
            return Ok(0);
        };
        let Some(dropship) = self.storage.get_dropship_order(*dropship_order_id)? else {
            tracing::warn!(dropship_order_id, "Dropship order vanished before stock update");
            return Ok(0);
        };

        let adjustments = match to {
            DropshipStatus::Cancelled => self.restorations(&dropship)?,
            DropshipStatus::Delivered => dropship
                .items
                .iter()
                .map(|item| StockAdjustment::ConsumeSupplierProduct {
                    supplier_product_id: item.supplier_product_id,
                    quantity: item.quantity,
                })
                .collect(),
            _ => return Ok(0),
        };

        if !adjustments.is_empty() {
            self.storage
                .apply_stock_adjustments(&adjustments, shared::util::now_millis())?;
            tracing::info!(
                dropship_order_id,
                status = %to,
                adjustments = adjustments.len(),
                "Stock adjusted"
            );
        }
        Ok(adjustments.len())
    }

    fn restorations(&self, dropship: &DropshipOrder) -> EngineResult<Vec<StockAdjustment>> {
        let mut out = Vec::with_capacity(dropship.items.len());
        for item in &dropship.items {
            match self.storage.get_product(item.product_id)? {
                Some(product) if product.is_virtual => {}
                Some(_) => out.push(StockAdjustment::RestoreProduct {
                    product_id: item.product_id,
                    quantity: item.quantity,
                }),
                None => {
                    tracing::warn!(product_id = item.product_id, "Product missing, stock not restored");
                }
            }
        }
        Ok(out)
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Arc<EngineEvent>>, shutdown: CancellationToken) {
        tracing::info!("Inventory handler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.apply(&event) {
                            tracing::error!(error = %e, "Failed to apply stock movement");
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Inventory handler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_decomposed_order, test_storage};

    fn cancelled_event(d: &DropshipOrder) -> EngineEvent {
        EngineEvent::DropshipStatusChanged {
            dropship_order_id: d.id,
            order_id: d.order_id,
            supplier_id: d.supplier_id,
            from: DropshipStatus::Pending,
            to: DropshipStatus::Cancelled,
        }
    }

    #[test]
    fn test_cancellation_restores_retail_stock() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let before: Vec<i64> = d
            .items
            .iter()
            .map(|i| storage.get_product(i.product_id).unwrap().unwrap().stock)
            .collect();

        let handler = InventoryHandler::new(storage.clone());
        assert_eq!(handler.apply(&cancelled_event(d)).unwrap(), d.items.len());

        for (item, stock) in d.items.iter().zip(before) {
            let product = storage.get_product(item.product_id).unwrap().unwrap();
            assert_eq!(product.stock, stock + item.quantity);
        }
    }

    #[test]
    fn test_virtual_products_are_not_restocked() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let product_id = d.items[0].product_id;
        let mut product = storage.get_product(product_id).unwrap().unwrap();
        product.is_virtual = true;
        storage.save_product(&product).unwrap();

        let handler = InventoryHandler::new(storage.clone());
        let written = handler.apply(&cancelled_event(d)).unwrap();
        assert_eq!(written, d.items.len() - 1);
        assert_eq!(
            storage.get_product(product_id).unwrap().unwrap().stock,
            product.stock
        );
    }

    #[test]
    fn test_delivery_consumes_supplier_stock() {
        let storage = test_storage();
        let (_, dropship) = seed_decomposed_order(&storage, 1);
        let d = &dropship[0];
        let sp_before = storage
            .get_supplier_product(d.items[0].supplier_product_id)
            .unwrap()
            .unwrap();

        let handler = InventoryHandler::new(storage.clone());
        handler
            .apply(&EngineEvent::DropshipStatusChanged {
                dropship_order_id: d.id,
                order_id: d.order_id,
                supplier_id: d.supplier_id,
                from: DropshipStatus::ShippedBySupplier,
                to: DropshipStatus::Delivered,
            })
            .unwrap();

        let sp_after = storage
            .get_supplier_product(d.items[0].supplier_product_id)
            .unwrap()
            .unwrap();
        assert_eq!(
            sp_after.stock_quantity,
            sp_before.stock_quantity - d.items[0].quantity
        );
    }
}
