//! Supplier status vocabulary

use shared::models::DropshipStatus;

/// External status string -> internal status. Case and separator
/// insensitive; anything not listed is `None` and gets dropped.
pub fn map_supplier_status(raw: &str) -> Option<DropshipStatus> {
    let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    let status = match key.as_str() {
        "pending" => DropshipStatus::Pending,
        "confirmed" => DropshipStatus::ConfirmedBySupplier,
        "processing" => DropshipStatus::Processing,
        "shipped" => DropshipStatus::ShippedBySupplier,
        "out_for_delivery" => DropshipStatus::OutForDelivery,
        "delivered" => DropshipStatus::Delivered,
        "cancelled" | "canceled" => DropshipStatus::Cancelled,
        "rejected" => DropshipStatus::RejectedBySupplier,
        "on_hold" => DropshipStatus::OnHold,
        _ => return None,
    };
    Some(status)
}
