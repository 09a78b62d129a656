//! Fixtures shared by unit tests

use crate::decomposition::Decomposer;
use crate::events::EventBus;
use crate::storage::EngineStorage;
use shared::models::{
    Customer, DropshipOrder, FulfillmentStatus, IntegrationType, MarkupRule, Order, OrderItem,
    OrderStatus, Product, ProductSupplierMapping, ShippingAddress, Supplier, SupplierIntegration,
    SupplierProduct, SupplierStatus, SyncStatus,
};

pub(crate) fn test_storage() -> EngineStorage {
    EngineStorage::open_in_memory().unwrap()
}

pub(crate) struct SeededCatalog {
    pub supplier: Supplier,
    pub integration: SupplierIntegration,
    pub products: Vec<Product>,
    pub supplier_products: Vec<SupplierProduct>,
    pub mappings: Vec<ProductSupplierMapping>,
}

pub(crate) fn integration(supplier_id: i64, integration_type: IntegrationType) -> SupplierIntegration {
    SupplierIntegration {
        id: 0,
        supplier_id,
        integration_type,
        api_endpoint: Some("http://supplier.invalid/v1".into()),
        api_key: Some(format!("key-{supplier_id}")),
        webhook_url: None,
        webhook_secret: Some(format!("secret-{supplier_id}")),
        ftp: None,
        email: None,
        is_active: true,
        consecutive_failures: 0,
        last_successful_sync: None,
        last_error: None,
        updated_at: 0,
    }
}

/// One active supplier with an API integration and `n` mapped products.
///
/// Supplier cost 1000, stock 50; retail price 1500 (fixed +500), stock 10.
pub(crate) fn seed_catalog(storage: &EngineStorage, n: usize) -> SeededCatalog {
    let supplier = storage
        .create_supplier(Supplier {
            id: 0,
            name: format!("Supplier {}", storage.list_suppliers().unwrap().len() + 1),
            email: Some("orders@supplier.test".into()),
            status: SupplierStatus::Active,
            created_at: 0,
        })
        .unwrap();
    let integration = storage
        .create_integration(integration(supplier.id, IntegrationType::Api))
        .unwrap();

    let mut products = Vec::new();
    let mut supplier_products = Vec::new();
    let mut mappings = Vec::new();
    for i in 0..n {
        let product = storage
            .create_product(Product {
                id: 0,
                name: format!("Widget {}-{i}", supplier.id),
                price: 1500,
                stock: 10,
                is_virtual: false,
                is_dropship: true,
                updated_at: 0,
            })
            .unwrap();
        let sp = storage
            .create_supplier_product(SupplierProduct {
                id: 0,
                supplier_id: supplier.id,
                supplier_sku: format!("SKU-{}-{i}", supplier.id),
                name: product.name.clone(),
                price: 1000,
                stock_quantity: 50,
                sync_status: SyncStatus::Synced,
                is_active: true,
                last_synced_at: None,
                updated_at: 0,
            })
            .unwrap();
        let mapping = storage
            .create_mapping(ProductSupplierMapping {
                id: 0,
                product_id: product.id,
                supplier_product_id: sp.id,
                supplier_id: supplier.id,
                markup: MarkupRule::Fixed { amount: 500 },
                auto_update_price: true,
                auto_update_stock: true,
                is_active: true,
                pending_price_change: None,
                updated_at: 0,
            })
            .unwrap();
        products.push(product);
        supplier_products.push(sp);
        mappings.push(mapping);
    }

    SeededCatalog {
        supplier,
        integration,
        products,
        supplier_products,
        mappings,
    }
}

pub(crate) fn paid_order(lines: &[(&Product, i64)]) -> Order {
    let items = lines
        .iter()
        .enumerate()
        .map(|(i, (product, quantity))| OrderItem {
            id: i as i64 + 1,
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: *quantity,
            unit_price: product.price,
        })
        .collect::<Vec<_>>();
    let total = items.iter().map(|i| i.quantity * i.unit_price).sum();
    Order {
        id: 0,
        order_number: "ORD-1001".into(),
        customer: Customer {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
        },
        shipping_address: Some(ShippingAddress {
            name: "Ada Lovelace".into(),
            line1: "12 Analytical Way".into(),
            line2: None,
            city: "London".into(),
            state: None,
            postal_code: "N1 9GU".into(),
            country: "GB".into(),
            phone: None,
        }),
        items,
        total,
        currency: "USD".into(),
        status: OrderStatus::Paid,
        fulfillment_status: FulfillmentStatus::Unfulfilled,
        notes: None,
        created_at: 0,
        updated_at: 0,
    }
}

/// A paid order over `suppliers` suppliers, two items of quantity 3 each,
/// already decomposed into one pending dropship order per supplier.
pub(crate) fn seed_decomposed_order(
    storage: &EngineStorage,
    suppliers: usize,
) -> (Order, Vec<DropshipOrder>) {
    let catalogs: Vec<_> = (0..suppliers).map(|_| seed_catalog(storage, 2)).collect();
    let lines: Vec<(&Product, i64)> = catalogs
        .iter()
        .flat_map(|c| c.products.iter().map(|p| (p, 3)))
        .collect();
    let order = storage.create_order(paid_order(&lines)).unwrap();
    let result = Decomposer::new(storage.clone(), EventBus::default())
        .decompose(order.id)
        .unwrap();
    let order = storage.get_order(order.id).unwrap().unwrap();
    (order, result.dropship_orders)
}
