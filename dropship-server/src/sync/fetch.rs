//! Supplier catalog feeds: paginated API and latest FTP CSV

use super::SupplierRecord;
use crate::core::config::SyncConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::transport::{FtpConnector, ftp};
use serde::Deserialize;
use serde_json::Value;
use shared::models::FtpConfig;
use std::sync::Arc;
use std::time::Duration;

/// Parsed feed. A row that cannot be read lands in `rejected` and the rest
/// of the feed still counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub records: Vec<SupplierRecord>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// SKU when the row still names one; such a product is not deactivated
    pub sku: Option<String>,
    pub error: String,
}

impl RejectedRow {
    fn new(sku: Option<&str>, error: String) -> Self {
        let sku = sku.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self { sku, error }
    }
}

#[derive(Debug, Deserialize)]
struct ProductPage {
    #[serde(default, alias = "data")]
    products: Vec<Value>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    total_pages: Option<u32>,
}

impl ProductPage {
    fn has_next(&self, page: u32) -> bool {
        if self.products.is_empty() {
            return false;
        }
        match (self.has_more, self.total_pages) {
            (Some(more), _) => more,
            (None, Some(total)) => page < total,
            (None, None) => false,
        }
    }
}

/// Collect every product from `{endpoint}/products`, capped at `max_pages`
pub async fn fetch_api_products(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    config: &SyncConfig,
) -> EngineResult<Feed> {
    let url = format!("{}/products", endpoint.trim_end_matches('/'));
    let mut feed = Feed::default();

    for page in 1..=config.max_pages {
        let response = client
            .get(&url)
            .bearer_auth(api_key)
            .query(&[
                ("page", page.to_string()),
                ("per_page", config.per_page.to_string()),
                ("include_inactive", "false".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::Configuration(format!(
                "supplier api rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "product page {page} returned {status}"
            )));
        }

        let body: ProductPage = response.json().await?;
        let more = body.has_next(page);
        tracing::debug!(page, count = body.products.len(), more, "Fetched product page");
        for (index, item) in body.products.into_iter().enumerate() {
            match serde_json::from_value::<SupplierRecord>(item.clone()) {
                Ok(record) => feed.records.push(record),
                Err(e) => {
                    let sku = item
                        .get("sku")
                        .or_else(|| item.get("supplier_sku"))
                        .and_then(Value::as_str);
                    tracing::warn!(page, index, sku, error = %e, "Unreadable product in feed");
                    feed.rejected.push(RejectedRow::new(
                        sku,
                        format!("page {page} item {}: {e}", index + 1),
                    ));
                }
            }
        }
        if !more {
            return Ok(feed);
        }
    }

    tracing::warn!(
        max_pages = config.max_pages,
        "Product feed hit the page cap, remaining pages skipped"
    );
    Ok(feed)
}

/// Newest `.csv` in the configured directory, parsed into records.
/// `None` when the directory has no CSV file.
pub async fn fetch_ftp_products(
    connector: Arc<dyn FtpConnector>,
    config: &FtpConfig,
    timeout: Duration,
) -> EngineResult<Option<Feed>> {
    let Some((name, data)) = ftp::fetch_latest_csv(connector, config.clone(), timeout).await? else {
        return Ok(None);
    };
    tracing::debug!(file = %name, bytes = data.len(), "Downloaded product feed");
    parse_csv(&data).map(Some)
}

/// Header row + one product per row. Only an unreadable header fails the
/// whole feed.
pub fn parse_csv(data: &[u8]) -> EngineResult<Feed> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| EngineError::Validation(format!("feed header: {e}")))?
        .clone();
    let sku_column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("sku") || h.eq_ignore_ascii_case("supplier_sku"));

    let mut feed = Feed::default();
    for (row, result) in reader.records().enumerate() {
        let line = row + 2;
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                feed.rejected
                    .push(RejectedRow::new(None, format!("feed row {line}: {e}")));
                continue;
            }
        };
        match raw.deserialize::<SupplierRecord>(Some(&headers)) {
            Ok(record) => feed.records.push(record),
            Err(e) => {
                let sku = sku_column.and_then(|i| raw.get(i));
                tracing::warn!(line, sku, error = %e, "Unreadable feed row");
                feed.rejected
                    .push(RejectedRow::new(sku, format!("feed row {line}: {e}")));
            }
        }
    }
    Ok(feed)
}
