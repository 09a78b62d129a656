//! Pure derivation of the parent order status from its dropship orders

use shared::models::{DropshipStatus, FulfillmentStatus, OrderStatus};

fn is_cancelled(status: DropshipStatus) -> bool {
    matches!(status, DropshipStatus::Cancelled | DropshipStatus::Refunded)
}

/// Derive the parent order status, first matching rule wins.
///
/// 1. all delivered -> delivered
/// 2. all cancelled -> cancelled
/// 3. only delivered and cancelled, at least one of each -> delivered
/// 4. any shipped or delivered -> shipped
/// 5. any out for delivery -> out_for_delivery
/// 6. any confirmed or processing -> processing
/// 7. all rejected or cancelled -> failed
/// 8. triggering child on hold -> on_hold
///
/// `None` means keep the current status. Refunded children count as cancelled.
pub fn aggregate_order_status(
    children: &[DropshipStatus],
    trigger: DropshipStatus,
) -> Option<OrderStatus> {
    if children.is_empty() {
        return None;
    }
    let total = children.len();
    let delivered = children
        .iter()
        .filter(|s| **s == DropshipStatus::Delivered)
        .count();
    let cancelled = children.iter().filter(|s| is_cancelled(**s)).count();
    let any = |wanted: &[DropshipStatus]| children.iter().any(|s| wanted.contains(s));

    if delivered == total {
        return Some(OrderStatus::Delivered);
    }
    if cancelled == total {
        return Some(OrderStatus::Cancelled);
    }
    if delivered > 0 && cancelled > 0 && delivered + cancelled == total {
        return Some(OrderStatus::Delivered);
    }
    if any(&[DropshipStatus::ShippedBySupplier, DropshipStatus::Delivered]) {
        return Some(OrderStatus::Shipped);
    }
    if any(&[DropshipStatus::OutForDelivery]) {
        return Some(OrderStatus::OutForDelivery);
    }
    if any(&[DropshipStatus::ConfirmedBySupplier, DropshipStatus::Processing]) {
        return Some(OrderStatus::Processing);
    }
    if children
        .iter()
        .all(|s| *s == DropshipStatus::RejectedBySupplier || is_cancelled(*s))
    {
        return Some(OrderStatus::Failed);
    }
    if trigger == DropshipStatus::OnHold {
        return Some(OrderStatus::OnHold);
    }
    None
}

/// Fulfillment status over the children that are not cancelled.
pub fn derive_fulfillment_status(children: &[DropshipStatus]) -> FulfillmentStatus {
    let cancelled = children.iter().filter(|s| is_cancelled(**s)).count();
    if !children.is_empty() && cancelled == children.len() {
        return FulfillmentStatus::Cancelled;
    }
    let active = children.len() - cancelled;
    let count = |wanted: &[DropshipStatus]| children.iter().filter(|s| wanted.contains(s)).count();

    let delivered = count(&[DropshipStatus::Delivered]);
    let shipped = count(&[
        DropshipStatus::ShippedBySupplier,
        DropshipStatus::OutForDelivery,
        DropshipStatus::Delivered,
    ]);
    let fulfilled = count(&[
        DropshipStatus::ConfirmedBySupplier,
        DropshipStatus::Processing,
        DropshipStatus::ShippedBySupplier,
        DropshipStatus::OutForDelivery,
        DropshipStatus::Delivered,
    ]);

    match (delivered, shipped, fulfilled) {
        (d, _, _) if d > 0 && d == active => FulfillmentStatus::Delivered,
        (d, _, _) if d > 0 => FulfillmentStatus::PartiallyDelivered,
        (_, s, _) if s > 0 && s == active => FulfillmentStatus::Shipped,
        (_, s, _) if s > 0 => FulfillmentStatus::PartiallyShipped,
        (_, _, f) if f > 0 && f == active => FulfillmentStatus::Fulfilled,
        (_, _, f) if f > 0 => FulfillmentStatus::PartiallyFulfilled,
        _ => FulfillmentStatus::Unfulfilled,
    }
}
