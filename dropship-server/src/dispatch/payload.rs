//! Normalized outbound order payload and its CSV rendering

use crate::core::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use shared::models::{Customer, DropshipOrder, ShippingAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundItem {
    pub sku: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub product_name: String,
}

/// Body sent to api and webhook integrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundOrderPayload {
    /// Our dropship order id
    pub external_order_id: String,
    pub customer: Customer,
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<OutboundItem>,
    pub total_amount: i64,
    pub currency: String,
    pub notes: Option<String>,
    /// RFC 3339
    pub created_at: String,
}

impl OutboundOrderPayload {
    pub fn from_dropship(order: &DropshipOrder) -> Self {
        Self {
            external_order_id: order.id.to_string(),
            customer: order.customer.clone(),
            shipping_address: order.shipping_address.clone(),
            items: order
                .items
                .iter()
                .map(|i| OutboundItem {
                    sku: i.supplier_sku.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_supplier_cost,
                    product_name: i.product_name.clone(),
                })
                .collect(),
            total_amount: order.total_cost,
            currency: order.currency.clone(),
            notes: Some(format!("Customer order {}", order.order_id)),
            created_at: chrono::DateTime::from_timestamp_millis(order.created_at)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }

    /// `order_{order_id}_{YYYYmmddHHMMSS}.csv`
    pub fn csv_filename(&self, at: chrono::DateTime<chrono::Utc>) -> String {
        format!(
            "order_{}_{}.csv",
            self.external_order_id,
            at.format("%Y%m%d%H%M%S")
        )
    }

    /// One row per line item, header row of field names
    pub fn to_csv(&self) -> EngineResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let address = self.shipping_address.as_ref();
        for item in &self.items {
            writer
                .serialize(CsvRow {
                    order_id: &self.external_order_id,
                    sku: &item.sku,
                    product_name: &item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    currency: &self.currency,
                    customer_name: &self.customer.name,
                    customer_email: &self.customer.email,
                    ship_name: address.map(|a| a.name.as_str()),
                    ship_line1: address.map(|a| a.line1.as_str()),
                    ship_line2: address.and_then(|a| a.line2.as_deref()),
                    ship_city: address.map(|a| a.city.as_str()),
                    ship_state: address.and_then(|a| a.state.as_deref()),
                    ship_postal_code: address.map(|a| a.postal_code.as_str()),
                    ship_country: address.map(|a| a.country.as_str()),
                    ship_phone: address.and_then(|a| a.phone.as_deref()),
                })
                .map_err(|e| EngineError::Validation(format!("csv render: {e}")))?;
        }
        writer
            .into_inner()
            .map_err(|e| EngineError::Validation(format!("csv render: {e}")))
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    order_id: &'a str,
    sku: &'a str,
    product_name: &'a str,
    quantity: i64,
    unit_price: i64,
    currency: &'a str,
    customer_name: &'a str,
    customer_email: &'a str,
    ship_name: Option<&'a str>,
    ship_line1: Option<&'a str>,
    ship_line2: Option<&'a str>,
    ship_city: Option<&'a str>,
    ship_state: Option<&'a str>,
    ship_postal_code: Option<&'a str>,
    ship_country: Option<&'a str>,
    ship_phone: Option<&'a str>,
}
