//! Order tables: customer orders, dropship orders, webhook replay guard, sync runs

use super::{
    DROPSHIP_BY_ORDER_TABLE, DROPSHIP_ORDERS_TABLE, EngineStorage, ORDERS_TABLE,
    PROCESSED_WEBHOOKS_TABLE, SYNC_RUNS_TABLE, StorageError, StorageResult, get_json, put_json,
};
use crate::sync::SyncReport;
use redb::ReadableTable;
use shared::models::{DropshipOrder, DropshipStatus, Order, OrderStatus};

impl EngineStorage {
    // ========== Customer Orders ==========

    pub fn create_order(&self, mut order: Order) -> StorageResult<Order> {
        let txn = self.begin_write()?;
        {
            order.id = self.next_id(&txn, "order")?;
            let mut table = txn.open_table(ORDERS_TABLE)?;
            put_json(&mut table, order.id, &order)?;
        }
        txn.commit()?;
        Ok(order)
    }

    pub fn get_order(&self, id: i64) -> StorageResult<Option<Order>> {
        self.load(ORDERS_TABLE, id)
    }

    pub fn update_order<F>(&self, id: i64, f: F) -> StorageResult<Order>
    where
        F: FnOnce(&mut Order),
    {
        self.modify(ORDERS_TABLE, "order", id, f)
    }

    /// Re-derive a customer order from its dropship orders.
    ///
    /// Children are read inside the same write transaction that updates the
    /// order, so two concurrent child transitions cannot both derive from a
    /// stale sibling view. Returns `None` when the order does not exist.
    pub fn update_order_with_children<F, R>(
        &self,
        order_id: i64,
        f: F,
    ) -> StorageResult<Option<(Order, R)>>
    where
        F: FnOnce(&mut Order, &[DropshipOrder]) -> R,
    {
        let txn = self.begin_write()?;
        let result = {
            let by_order = txn.open_table(DROPSHIP_BY_ORDER_TABLE)?;
            let dropship = txn.open_table(DROPSHIP_ORDERS_TABLE)?;
            let mut children = Vec::new();
            for entry in by_order.range((order_id, i64::MIN)..=(order_id, i64::MAX))? {
                let (_key, id) = entry?;
                if let Some(row) = get_json::<DropshipOrder>(&dropship, id.value())? {
                    children.push(row);
                }
            }
            children.sort_by_key(|d| d.id);

            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let current: Option<Order> = get_json(&orders, order_id)?;
            match current {
                Some(mut order) => {
                    let out = f(&mut order, &children);
                    put_json(&mut orders, order_id, &order)?;
                    Some((order, out))
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(result)
    }

    // ========== Dropship Orders ==========

    /// Persist the dropship orders of one customer order and advance the
    /// parent to `processing`, all in one transaction.
    ///
    /// Fails with [`StorageError::AlreadyDecomposed`] when any dropship order
    /// already exists for `order_id`, which makes decomposition exactly-once.
    /// Returns the created rows and the parent status before the change.
    pub fn create_dropship_orders(
        &self,
        order_id: i64,
        drafts: Vec<DropshipOrder>,
        now: i64,
    ) -> StorageResult<(Vec<DropshipOrder>, OrderStatus)> {
        let txn = self.begin_write()?;
        let mut created = Vec::with_capacity(drafts.len());
        let previous_status;
        {
            let mut by_order = txn.open_table(DROPSHIP_BY_ORDER_TABLE)?;
            let existing = by_order
                .range((order_id, i64::MIN)..=(order_id, i64::MAX))?
                .next()
                .is_some();
            if existing {
                return Err(StorageError::AlreadyDecomposed(order_id));
            }

            for mut draft in drafts {
                draft.id = self.next_id(&txn, "dropship_order")?;
                draft.order_id = order_id;
                by_order.insert((order_id, draft.supplier_id), draft.id)?;
                let mut table = txn.open_table(DROPSHIP_ORDERS_TABLE)?;
                put_json(&mut table, draft.id, &draft)?;
                created.push(draft);
            }

            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let current: Option<Order> = get_json(&orders, order_id)?;
            let mut order = current.ok_or(StorageError::NotFound {
                entity: "order",
                id: order_id,
            })?;
            previous_status = order.status;
            order.status = OrderStatus::Processing;
            order.updated_at = now;
            put_json(&mut orders, order_id, &order)?;
        }
        txn.commit()?;
        Ok((created, previous_status))
    }

    pub fn get_dropship_order(&self, id: i64) -> StorageResult<Option<DropshipOrder>> {
        self.load(DROPSHIP_ORDERS_TABLE, id)
    }

    /// All dropship orders of a customer order, ordered by id
    pub fn dropship_orders_for_order(&self, order_id: i64) -> StorageResult<Vec<DropshipOrder>> {
        let read_txn = self.begin_read()?;
        let by_order = read_txn.open_table(DROPSHIP_BY_ORDER_TABLE)?;
        let table = read_txn.open_table(DROPSHIP_ORDERS_TABLE)?;

        let mut rows = Vec::new();
        for result in by_order.range((order_id, i64::MIN)..=(order_id, i64::MAX))? {
            let (_key, id) = result?;
            if let Some(row) = get_json::<DropshipOrder>(&table, id.value())? {
                rows.push(row);
            }
        }
        rows.sort_by_key(|d| d.id);
        Ok(rows)
    }

    pub fn find_dropship_by_supplier_order_id(
        &self,
        supplier_id: i64,
        supplier_order_id: &str,
    ) -> StorageResult<Option<DropshipOrder>> {
        let rows: Vec<DropshipOrder> = self.load_all(DROPSHIP_ORDERS_TABLE)?;
        Ok(rows.into_iter().find(|d| {
            d.supplier_id == supplier_id && d.supplier_order_id.as_deref() == Some(supplier_order_id)
        }))
    }

    pub fn dropship_orders_with_status(
        &self,
        statuses: &[DropshipStatus],
    ) -> StorageResult<Vec<DropshipOrder>> {
        let mut rows: Vec<DropshipOrder> = self.load_all(DROPSHIP_ORDERS_TABLE)?;
        rows.retain(|d| statuses.contains(&d.status));
        rows.sort_by_key(|d| d.id);
        Ok(rows)
    }

    /// Status compare-and-set.
    ///
    /// Re-reads the row inside a write transaction; when its status is not
    /// `expected` nothing is written and [`StorageError::StatusConflict`] is
    /// returned. Otherwise `apply` runs on the fresh row and the result is
    /// committed.
    pub fn compare_and_set_status<F>(
        &self,
        id: i64,
        expected: DropshipStatus,
        apply: F,
    ) -> StorageResult<DropshipOrder>
    where
        F: FnOnce(&mut DropshipOrder),
    {
        let txn = self.begin_write()?;
        let updated = {
            let mut table = txn.open_table(DROPSHIP_ORDERS_TABLE)?;
            let current: Option<DropshipOrder> = get_json(&table, id)?;
            let mut row = current.ok_or(StorageError::NotFound {
                entity: "dropship order",
                id,
            })?;
            if row.status != expected {
                return Err(StorageError::StatusConflict {
                    id,
                    expected,
                    actual: row.status,
                });
            }
            apply(&mut row);
            put_json(&mut table, id, &row)?;
            row
        };
        txn.commit()?;
        Ok(updated)
    }

    /// Non-status update (audit notes, failure reason)
    pub fn update_dropship_order<F>(&self, id: i64, f: F) -> StorageResult<DropshipOrder>
    where
        F: FnOnce(&mut DropshipOrder),
    {
        self.modify(DROPSHIP_ORDERS_TABLE, "dropship order", id, f)
    }

    // ========== Webhook Replay Guard ==========

    pub fn is_webhook_processed(&self, event_id: &str) -> StorageResult<bool> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PROCESSED_WEBHOOKS_TABLE)?;
        Ok(table.get(event_id)?.is_some())
    }

    /// Record a webhook event id. Returns `false` if it was already recorded.
    pub fn mark_webhook_processed(&self, event_id: &str, now: i64) -> StorageResult<bool> {
        let txn = self.begin_write()?;
        let inserted = {
            let mut table = txn.open_table(PROCESSED_WEBHOOKS_TABLE)?;
            let previous = table.insert(event_id, now)?;
            previous.is_none()
        };
        txn.commit()?;
        Ok(inserted)
    }

    // ========== Sync Runs ==========

    pub fn save_sync_report(&self, supplier_id: i64, report: &SyncReport) -> StorageResult<()> {
        self.store(SYNC_RUNS_TABLE, supplier_id, report)
    }

    pub fn get_sync_report(&self, supplier_id: i64) -> StorageResult<Option<SyncReport>> {
        self.load(SYNC_RUNS_TABLE, supplier_id)
    }
}
