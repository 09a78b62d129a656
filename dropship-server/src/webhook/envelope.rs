//! Inbound supplier event envelope

use crate::sync::SupplierRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "order.status_changed")]
    OrderStatusChanged,
    #[serde(rename = "order.shipped")]
    OrderShipped,
    #[serde(rename = "order.delivered")]
    OrderDelivered,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "order.rejected")]
    OrderRejected,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.price_changed")]
    PriceChanged,
    #[serde(rename = "product.stock_changed")]
    StockChanged,
    #[serde(rename = "product.discontinued")]
    ProductDiscontinued,
}

impl WebhookEvent {
    pub fn parse(raw: &str) -> Option<Self> {
        let event = match raw.trim() {
            "order.status_changed" => Self::OrderStatusChanged,
            "order.shipped" => Self::OrderShipped,
            "order.delivered" => Self::OrderDelivered,
            "order.cancelled" => Self::OrderCancelled,
            "order.rejected" => Self::OrderRejected,
            "product.updated" => Self::ProductUpdated,
            "product.price_changed" | "price_changed" => Self::PriceChanged,
            "product.stock_changed" => Self::StockChanged,
            "product.discontinued" => Self::ProductDiscontinued,
            _ => return None,
        };
        Some(event)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderStatusChanged => "order.status_changed",
            Self::OrderShipped => "order.shipped",
            Self::OrderDelivered => "order.delivered",
            Self::OrderCancelled => "order.cancelled",
            Self::OrderRejected => "order.rejected",
            Self::ProductUpdated => "product.updated",
            Self::PriceChanged => "product.price_changed",
            Self::StockChanged => "product.stock_changed",
            Self::ProductDiscontinued => "product.discontinued",
        }
    }

    pub fn is_order_event(&self) -> bool {
        matches!(
            self,
            Self::OrderStatusChanged
                | Self::OrderShipped
                | Self::OrderDelivered
                | Self::OrderCancelled
                | Self::OrderRejected
        )
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order section of an order event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Our dropship order id (numeric or the `external_order_id` string we sent)
    #[serde(default, alias = "external_order_id", deserialize_with = "lenient_id")]
    pub dropship_order_id: Option<i64>,
    #[serde(default)]
    pub supplier_order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parsed envelope. The raw JSON is kept separately for signature checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub supplier_id: Option<i64>,
    /// Supplier name
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub order: Option<OrderUpdate>,
    #[serde(default)]
    pub product: Option<SupplierRecord>,
    #[serde(default)]
    pub stock: Option<SupplierRecord>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl WebhookEnvelope {
    /// Product body of a product event (`stock` for stock events)
    pub fn product_record(&self) -> Option<&SupplierRecord> {
        self.product.as_ref().or(self.stock.as_ref())
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
