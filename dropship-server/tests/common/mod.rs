//! 集成测试公共夹具
//!
//! 真实的 ServerState + redb 文件 (tempfile) + 后台任务，HTTP 走 Router::oneshot，
//! 供应商 API 由 httpmock 扮演。

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use dropship_server::dispatch::transport::InMemoryFtp;
use dropship_server::notify::LogNotifier;
use dropship_server::webhook::signature::sign_envelope;
use dropship_server::{BackgroundTasks, Config, EngineStorage, ServerState, api};
use http::{Request, StatusCode};
use serde_json::Value;
use shared::models::{
    Customer, FulfillmentStatus, IntegrationType, MarkupRule, Order, OrderItem, OrderStatus,
    Product, ProductSupplierMapping, ShippingAddress, Supplier, SupplierIntegration,
    SupplierProduct, SupplierStatus, SyncStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestEngine {
    pub state: ServerState,
    pub app: Router,
    tasks: Option<BackgroundTasks>,
    _dir: TempDir,
}

impl TestEngine {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_overrides(dir.path().to_string_lossy(), 0);
        config.queue.base_backoff_secs = 0;
        config.retry_scan.interval_secs = 3600;
        config.sync.interval_secs = 3600;

        let storage = EngineStorage::open(config.database_path()).unwrap();
        let (state, workers) = ServerState::new(
            config,
            storage,
            Arc::new(InMemoryFtp::new()),
            Arc::new(LogNotifier),
        )
        .unwrap();
        let mut tasks = BackgroundTasks::new();
        state.start_background(workers, &mut tasks);

        Self {
            app: api::build_app(state.clone()),
            state,
            tasks: Some(tasks),
            _dir: dir,
        }
    }

    pub fn storage(&self) -> &EngineStorage {
        &self.state.storage
    }

    pub async fn shutdown(mut self) {
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await;
        }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Sign with the supplier's secret and POST to the webhook endpoint
    pub async fn send_webhook(&self, mut envelope: Value) -> (StatusCode, Value) {
        sign_envelope(WEBHOOK_SECRET, &mut envelope);
        self.request("POST", "/api/webhooks/suppliers", Some(envelope))
            .await
    }
}

/// Poll until `check` holds (5s max)
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut check: F) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

pub struct Catalog {
    pub supplier: Supplier,
    pub integration: SupplierIntegration,
    pub products: Vec<Product>,
    pub supplier_products: Vec<SupplierProduct>,
    pub mappings: Vec<ProductSupplierMapping>,
}

/// Active supplier on the API transport at `endpoint`, `n` products.
/// Supplier cost 1000 (10.00), stock 50; retail 1500, stock 10.
pub fn seed_catalog(storage: &EngineStorage, endpoint: &str, n: usize) -> Catalog {
    let supplier = storage
        .create_supplier(Supplier {
            id: 0,
            name: "Acme Wholesale".into(),
            email: Some("orders@acme.test".into()),
            status: SupplierStatus::Active,
            created_at: 0,
        })
        .unwrap();
    let integration = storage
        .create_integration(SupplierIntegration {
            id: 0,
            supplier_id: supplier.id,
            integration_type: IntegrationType::Api,
            api_endpoint: Some(endpoint.to_string()),
            api_key: Some("acme-key".into()),
            webhook_url: None,
            webhook_secret: Some(WEBHOOK_SECRET.into()),
            ftp: None,
            email: None,
            is_active: true,
            consecutive_failures: 0,
            last_successful_sync: None,
            last_error: None,
            updated_at: 0,
        })
        .unwrap();

    let mut products = Vec::new();
    let mut supplier_products = Vec::new();
    let mut mappings = Vec::new();
    for i in 0..n {
        let product = storage
            .create_product(Product {
                id: 0,
                name: format!("Lamp {i}"),
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
                supplier_sku: format!("ACME-{i}"),
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

    Catalog {
        supplier,
        integration,
        products,
        supplier_products,
        mappings,
    }
}

/// Paid order, quantity 3 of every product
pub fn create_paid_order(storage: &EngineStorage, products: &[Product]) -> Order {
    let items: Vec<OrderItem> = products
        .iter()
        .enumerate()
        .map(|(i, p)| OrderItem {
            id: i as i64 + 1,
            product_id: p.id,
            product_name: p.name.clone(),
            quantity: 3,
            unit_price: p.price,
        })
        .collect();
    let total = items.iter().map(|i| i.quantity * i.unit_price).sum();
    storage
        .create_order(Order {
            id: 0,
            order_number: "ORD-2001".into(),
            customer: Customer {
                name: "Grace Hopper".into(),
                email: "grace@example.com".into(),
            },
            shipping_address: Some(ShippingAddress {
                name: "Grace Hopper".into(),
                line1: "1 Navy Yard".into(),
                line2: None,
                city: "Arlington".into(),
                state: Some("VA".into()),
                postal_code: "22202".into(),
                country: "US".into(),
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
        })
        .unwrap()
}
