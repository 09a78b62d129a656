//! redb-based storage layer for the dropship engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `suppliers` | `id` | `Supplier` | Supplier registry |
//! | `integrations` | `id` | `SupplierIntegration` | Transport config + failure counters |
//! | `supplier_products` | `id` | `SupplierProduct` | Supplier catalog |
//! | `supplier_sku_index` | `(supplier_id, sku)` | `id` | Unique (supplier, sku) lookup |
//! | `mappings` | `id` | `ProductSupplierMapping` | Retail ↔ supplier links |
//! | `products` | `id` | `Product` | Retail products |
//! | `orders` | `id` | `Order` | Customer orders |
//! | `dropship_orders` | `id` | `DropshipOrder` | Supplier sub-orders |
//! | `dropship_by_order` | `(order_id, supplier_id)` | `id` | Exactly-once decomposition guard |
//! | `processed_webhooks` | `event_id` | `received_at` | Webhook replay guard |
//! | `sync_runs` | `supplier_id` | `SyncReport` | Last sync report per supplier |
//! | `counters` | `name` | `u64` | ID allocation |
//!
//! All values are JSON-encoded. Every multi-row change (decomposition, a
//! sync batch, a status compare-and-set) runs inside a single write
//! transaction, so a crash never leaves a half-applied change behind.

mod catalog;
mod orders;

pub use catalog::{CatalogWrite, StockAdjustment};

use redb::{
    Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::DropshipStatus;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub(crate) const SUPPLIERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("suppliers");
pub(crate) const INTEGRATIONS_TABLE: TableDefinition<i64, &[u8]> =
    TableDefinition::new("integrations");
pub(crate) const SUPPLIER_PRODUCTS_TABLE: TableDefinition<i64, &[u8]> =
    TableDefinition::new("supplier_products");
pub(crate) const SUPPLIER_SKU_INDEX_TABLE: TableDefinition<(i64, &str), i64> =
    TableDefinition::new("supplier_sku_index");
pub(crate) const MAPPINGS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("mappings");
pub(crate) const PRODUCTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("products");
pub(crate) const ORDERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("orders");
pub(crate) const DROPSHIP_ORDERS_TABLE: TableDefinition<i64, &[u8]> =
    TableDefinition::new("dropship_orders");
pub(crate) const DROPSHIP_BY_ORDER_TABLE: TableDefinition<(i64, i64), i64> =
    TableDefinition::new("dropship_by_order");
pub(crate) const PROCESSED_WEBHOOKS_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("processed_webhooks");
pub(crate) const SYNC_RUNS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("sync_runs");
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Status conflict on dropship order {id}: expected {expected}, found {actual}")]
    StatusConflict {
        id: i64,
        expected: DropshipStatus,
        actual: DropshipStatus,
    },

    #[error("Order {0} already has dropship orders")]
    AlreadyDecomposed(i64),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Engine storage backed by redb
#[derive(Clone)]
pub struct EngineStorage {
    db: Arc<Database>,
}

impl EngineStorage {
    /// Open or create the database at the given path
    ///
    /// redb commits are durable once `commit()` returns (copy-on-write with
    /// atomic pointer swap), so a crash mid-batch leaves the previous state.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            // Create all tables if they don't exist
            let _ = write_txn.open_table(SUPPLIERS_TABLE)?;
            let _ = write_txn.open_table(INTEGRATIONS_TABLE)?;
            let _ = write_txn.open_table(SUPPLIER_PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(SUPPLIER_SKU_INDEX_TABLE)?;
            let _ = write_txn.open_table(MAPPINGS_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(DROPSHIP_ORDERS_TABLE)?;
            let _ = write_txn.open_table(DROPSHIP_BY_ORDER_TABLE)?;
            let _ = write_txn.open_table(PROCESSED_WEBHOOKS_TABLE)?;
            let _ = write_txn.open_table(SYNC_RUNS_TABLE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub(crate) fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begin a read transaction
    pub(crate) fn begin_read(&self) -> StorageResult<redb::ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    // ========== ID Allocation ==========

    /// Allocate the next id for `name` (within transaction)
    pub(crate) fn next_id(&self, txn: &WriteTransaction, name: &str) -> StorageResult<i64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table.get(name)?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(name, next)?;
        Ok(next as i64)
    }

    // ========== Generic Row Access ==========

    pub(crate) fn load<T: DeserializeOwned>(
        &self,
        def: TableDefinition<i64, &'static [u8]>,
        id: i64,
    ) -> StorageResult<Option<T>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(def)?;
        get_json(&table, id)
    }

    pub(crate) fn load_all<T: DeserializeOwned>(
        &self,
        def: TableDefinition<i64, &'static [u8]>,
    ) -> StorageResult<Vec<T>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(def)?;
        scan_json(&table)
    }

    pub(crate) fn store<T: Serialize>(
        &self,
        def: TableDefinition<i64, &'static [u8]>,
        id: i64,
        value: &T,
    ) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(def)?;
            put_json(&mut table, id, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Read-modify-write of a single row inside one write transaction
    pub(crate) fn modify<T, F>(
        &self,
        def: TableDefinition<i64, &'static [u8]>,
        entity: &'static str,
        id: i64,
        f: F,
    ) -> StorageResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let txn = self.begin_write()?;
        let updated = {
            let mut table = txn.open_table(def)?;
            // Read and clone first to avoid borrow conflict
            let mut row: T = get_json(&table, id)?.ok_or(StorageError::NotFound { entity, id })?;
            f(&mut row);
            put_json(&mut table, id, &row)?;
            row
        };
        txn.commit()?;
        Ok(updated)
    }
}

pub(crate) fn get_json<T: DeserializeOwned>(
    table: &impl ReadableTable<i64, &'static [u8]>,
    id: i64,
) -> StorageResult<Option<T>> {
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn scan_json<T: DeserializeOwned>(
    table: &impl ReadableTable<i64, &'static [u8]>,
) -> StorageResult<Vec<T>> {
    let mut rows = Vec::new();
    for result in table.iter()? {
        let (_key, value) = result?;
        rows.push(serde_json::from_slice(value.value())?);
    }
    Ok(rows)
}

pub(crate) fn put_json<T: Serialize>(
    table: &mut Table<'_, i64, &'static [u8]>,
    id: i64,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec(value)?;
    table.insert(id, bytes.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_is_per_counter() {
        let storage = EngineStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        assert_eq!(storage.next_id(&txn, "supplier").unwrap(), 1);
        assert_eq!(storage.next_id(&txn, "supplier").unwrap(), 2);
        assert_eq!(storage.next_id(&txn, "order").unwrap(), 1);
        txn.commit().unwrap();
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.redb");
        {
            let storage = EngineStorage::open(&path).unwrap();
            storage
                .store(SYNC_RUNS_TABLE, 7, &serde_json::json!({"found": 3}))
                .unwrap();
        }
        let storage = EngineStorage::open(&path).unwrap();
        let value: Option<serde_json::Value> = storage.load(SYNC_RUNS_TABLE, 7).unwrap();
        assert_eq!(value.unwrap()["found"], 3);
    }
}
