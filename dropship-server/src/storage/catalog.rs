//! Catalog tables: suppliers, integrations, supplier products, mappings, retail products

use super::{
    EngineStorage, INTEGRATIONS_TABLE, MAPPINGS_TABLE, PRODUCTS_TABLE, SUPPLIERS_TABLE,
    SUPPLIER_PRODUCTS_TABLE, SUPPLIER_SKU_INDEX_TABLE, StorageError, StorageResult, get_json,
    put_json,
};
use redb::WriteTransaction;
use shared::models::{
    Product, ProductSupplierMapping, Supplier, SupplierIntegration, SupplierProduct,
};

/// One row change inside an atomic catalog batch
#[derive(Debug, Clone)]
pub enum CatalogWrite {
    /// Insert (id == 0 allocates a new id) or overwrite a supplier product
    SupplierProduct(SupplierProduct),
    /// Overwrite a mapping
    Mapping(ProductSupplierMapping),
    /// Set a retail product's price (re-read inside the transaction)
    ProductPrice { product_id: i64, price: i64 },
    /// Set a retail product's stock (re-read inside the transaction)
    ProductStock { product_id: i64, stock: i64 },
}

/// Relative stock movement applied by the inventory handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Retail product stock += quantity
    RestoreProduct { product_id: i64, quantity: i64 },
    /// Supplier product stock -= quantity (floored at zero)
    ConsumeSupplierProduct { supplier_product_id: i64, quantity: i64 },
}

impl EngineStorage {
    // ========== Suppliers ==========

    pub fn create_supplier(&self, mut supplier: Supplier) -> StorageResult<Supplier> {
        let txn = self.begin_write()?;
        {
            supplier.id = self.next_id(&txn, "supplier")?;
            let mut table = txn.open_table(SUPPLIERS_TABLE)?;
            put_json(&mut table, supplier.id, &supplier)?;
        }
        txn.commit()?;
        Ok(supplier)
    }

    pub fn save_supplier(&self, supplier: &Supplier) -> StorageResult<()> {
        self.store(SUPPLIERS_TABLE, supplier.id, supplier)
    }

    pub fn get_supplier(&self, id: i64) -> StorageResult<Option<Supplier>> {
        self.load(SUPPLIERS_TABLE, id)
    }

    pub fn list_suppliers(&self) -> StorageResult<Vec<Supplier>> {
        self.load_all(SUPPLIERS_TABLE)
    }

    pub fn find_supplier_by_name(&self, name: &str) -> StorageResult<Option<Supplier>> {
        Ok(self
            .list_suppliers()?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    // ========== Integrations ==========

    pub fn create_integration(
        &self,
        mut integration: SupplierIntegration,
    ) -> StorageResult<SupplierIntegration> {
        let txn = self.begin_write()?;
        {
            integration.id = self.next_id(&txn, "integration")?;
            let mut table = txn.open_table(INTEGRATIONS_TABLE)?;
            put_json(&mut table, integration.id, &integration)?;
        }
        txn.commit()?;
        Ok(integration)
    }

    pub fn get_integration(&self, id: i64) -> StorageResult<Option<SupplierIntegration>> {
        self.load(INTEGRATIONS_TABLE, id)
    }

    pub fn integrations_for_supplier(
        &self,
        supplier_id: i64,
    ) -> StorageResult<Vec<SupplierIntegration>> {
        let mut rows: Vec<SupplierIntegration> = self.load_all(INTEGRATIONS_TABLE)?;
        rows.retain(|i| i.supplier_id == supplier_id);
        Ok(rows)
    }

    /// The supplier's active integration used for order submission
    pub fn active_integration(
        &self,
        supplier_id: i64,
    ) -> StorageResult<Option<SupplierIntegration>> {
        Ok(self
            .integrations_for_supplier(supplier_id)?
            .into_iter()
            .find(|i| i.is_active))
    }

    /// Match an API key embedded in an inbound payload against stored integrations
    pub fn find_integration_by_api_key(
        &self,
        api_key: &str,
    ) -> StorageResult<Option<SupplierIntegration>> {
        let rows: Vec<SupplierIntegration> = self.load_all(INTEGRATIONS_TABLE)?;
        Ok(rows
            .into_iter()
            .find(|i| i.api_key.as_deref() == Some(api_key)))
    }

    /// Atomically update an integration (failure counters, timestamps)
    pub fn update_integration<F>(&self, id: i64, f: F) -> StorageResult<SupplierIntegration>
    where
        F: FnOnce(&mut SupplierIntegration),
    {
        self.modify(INTEGRATIONS_TABLE, "integration", id, f)
    }

    // ========== Supplier Products ==========

    pub fn create_supplier_product(
        &self,
        product: SupplierProduct,
    ) -> StorageResult<SupplierProduct> {
        let txn = self.begin_write()?;
        let saved = self.upsert_supplier_product_txn(&txn, product)?;
        txn.commit()?;
        Ok(saved)
    }

    pub fn get_supplier_product(&self, id: i64) -> StorageResult<Option<SupplierProduct>> {
        self.load(SUPPLIER_PRODUCTS_TABLE, id)
    }

    pub fn find_supplier_product(
        &self,
        supplier_id: i64,
        sku: &str,
    ) -> StorageResult<Option<SupplierProduct>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(SUPPLIER_SKU_INDEX_TABLE)?;
        let id = match index.get((supplier_id, sku))? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(SUPPLIER_PRODUCTS_TABLE)?;
        get_json(&table, id)
    }

    pub fn supplier_products_for(&self, supplier_id: i64) -> StorageResult<Vec<SupplierProduct>> {
        let mut rows: Vec<SupplierProduct> = self.load_all(SUPPLIER_PRODUCTS_TABLE)?;
        rows.retain(|p| p.supplier_id == supplier_id);
        Ok(rows)
    }

    /// Active supplier products carrying `sku`, across all suppliers
    pub fn supplier_products_by_sku(&self, sku: &str) -> StorageResult<Vec<SupplierProduct>> {
        let mut rows: Vec<SupplierProduct> = self.load_all(SUPPLIER_PRODUCTS_TABLE)?;
        rows.retain(|p| p.is_active && p.supplier_sku == sku);
        Ok(rows)
    }

    fn upsert_supplier_product_txn(
        &self,
        txn: &WriteTransaction,
        mut product: SupplierProduct,
    ) -> StorageResult<SupplierProduct> {
        if product.id == 0 {
            product.id = self.next_id(txn, "supplier_product")?;
        }
        let mut index = txn.open_table(SUPPLIER_SKU_INDEX_TABLE)?;
        index.insert((product.supplier_id, product.supplier_sku.as_str()), product.id)?;
        let mut table = txn.open_table(SUPPLIER_PRODUCTS_TABLE)?;
        put_json(&mut table, product.id, &product)?;
        Ok(product)
    }

    // ========== Mappings ==========

    pub fn create_mapping(
        &self,
        mut mapping: ProductSupplierMapping,
    ) -> StorageResult<ProductSupplierMapping> {
        let txn = self.begin_write()?;
        {
            mapping.id = self.next_id(&txn, "mapping")?;
            let mut table = txn.open_table(MAPPINGS_TABLE)?;
            put_json(&mut table, mapping.id, &mapping)?;
        }
        txn.commit()?;
        Ok(mapping)
    }

    pub fn save_mapping(&self, mapping: &ProductSupplierMapping) -> StorageResult<()> {
        self.store(MAPPINGS_TABLE, mapping.id, mapping)
    }

    pub fn get_mapping(&self, id: i64) -> StorageResult<Option<ProductSupplierMapping>> {
        self.load(MAPPINGS_TABLE, id)
    }

    pub fn update_mapping<F>(&self, id: i64, f: F) -> StorageResult<ProductSupplierMapping>
    where
        F: FnOnce(&mut ProductSupplierMapping),
    {
        self.modify(MAPPINGS_TABLE, "mapping", id, f)
    }

    pub fn list_mappings(&self) -> StorageResult<Vec<ProductSupplierMapping>> {
        self.load_all(MAPPINGS_TABLE)
    }

    pub fn mappings_for_supplier_product(
        &self,
        supplier_product_id: i64,
    ) -> StorageResult<Vec<ProductSupplierMapping>> {
        let mut rows = self.list_mappings()?;
        rows.retain(|m| m.supplier_product_id == supplier_product_id);
        Ok(rows)
    }

    /// Active mappings of a retail product, lowest id first
    pub fn active_mappings_for_product(
        &self,
        product_id: i64,
    ) -> StorageResult<Vec<ProductSupplierMapping>> {
        let mut rows = self.list_mappings()?;
        rows.retain(|m| m.product_id == product_id && m.is_active);
        rows.sort_by_key(|m| m.id);
        Ok(rows)
    }

    pub fn mappings_with_pending_price(&self) -> StorageResult<Vec<ProductSupplierMapping>> {
        let mut rows = self.list_mappings()?;
        rows.retain(|m| m.pending_price_change.is_some());
        Ok(rows)
    }

    // ========== Retail Products ==========

    pub fn create_product(&self, mut product: Product) -> StorageResult<Product> {
        let txn = self.begin_write()?;
        {
            product.id = self.next_id(&txn, "product")?;
            let mut table = txn.open_table(PRODUCTS_TABLE)?;
            put_json(&mut table, product.id, &product)?;
        }
        txn.commit()?;
        Ok(product)
    }

    pub fn save_product(&self, product: &Product) -> StorageResult<()> {
        self.store(PRODUCTS_TABLE, product.id, product)
    }

    pub fn get_product(&self, id: i64) -> StorageResult<Option<Product>> {
        self.load(PRODUCTS_TABLE, id)
    }

    // ========== Batches ==========

    /// Apply a catalog batch in ONE write transaction.
    ///
    /// Used by sync reconciliation and supplier product webhooks. Either every
    /// write lands or none does.
    pub fn apply_sync_batch(&self, writes: &[CatalogWrite], now: i64) -> StorageResult<()> {
        let txn = self.begin_write()?;
        for write in writes {
            match write {
                CatalogWrite::SupplierProduct(product) => {
                    self.upsert_supplier_product_txn(&txn, product.clone())?;
                }
                CatalogWrite::Mapping(mapping) => {
                    let mut table = txn.open_table(MAPPINGS_TABLE)?;
                    put_json(&mut table, mapping.id, mapping)?;
                }
                CatalogWrite::ProductPrice { product_id, price } => {
                    modify_product(&txn, *product_id, |p| {
                        p.price = *price;
                        p.updated_at = now;
                    })?;
                }
                CatalogWrite::ProductStock { product_id, stock } => {
                    modify_product(&txn, *product_id, |p| {
                        p.stock = *stock;
                        p.updated_at = now;
                    })?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Apply relative stock movements in one write transaction
    pub fn apply_stock_adjustments(
        &self,
        adjustments: &[StockAdjustment],
        now: i64,
    ) -> StorageResult<()> {
        let txn = self.begin_write()?;
        for adjustment in adjustments {
            match *adjustment {
                StockAdjustment::RestoreProduct {
                    product_id,
                    quantity,
                } => {
                    modify_product(&txn, product_id, |p| {
                        p.stock += quantity;
                        p.updated_at = now;
                    })?;
                }
                StockAdjustment::ConsumeSupplierProduct {
                    supplier_product_id,
                    quantity,
                } => {
                    let mut table = txn.open_table(SUPPLIER_PRODUCTS_TABLE)?;
                    let current: Option<SupplierProduct> =
                        get_json(&table, supplier_product_id)?;
                    let mut sp = current.ok_or(StorageError::NotFound {
                        entity: "supplier product",
                        id: supplier_product_id,
                    })?;
                    sp.stock_quantity = (sp.stock_quantity - quantity).max(0);
                    sp.updated_at = now;
                    put_json(&mut table, sp.id, &sp)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}

fn modify_product<F: FnOnce(&mut Product)>(
    txn: &WriteTransaction,
    product_id: i64,
    f: F,
) -> StorageResult<()> {
    let mut table = txn.open_table(PRODUCTS_TABLE)?;
    let current: Option<Product> = get_json(&table, product_id)?;
    match current {
        Some(mut product) => {
            f(&mut product);
            put_json(&mut table, product_id, &product)
        }
        None => {
            tracing::warn!(product_id, "Retail product missing, write skipped");
            Ok(())
        }
    }
}
