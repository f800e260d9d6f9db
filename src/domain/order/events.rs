use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Status History
// ============================================================================
//
// Every status an order passes through is recorded as an immutable entry.
// The creation entry has no `from`; each later entry carries the status it
// replaced, which doubles as the write precondition in the store.
//
// ============================================================================

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    #[serde(skip_serializing)]
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub order_id: Uuid,
    pub from: Option<OrderStatus>,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}

impl OrderStatusChanged {
    /// First history entry of a freshly placed order
    pub fn placed(order_id: Uuid, placed_by: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            from: None,
            status: OrderStatus::Pending,
            note: None,
            changed_by: placed_by,
            changed_at: at,
        }
    }

    /// Cancelling before shipment hands the reserved units back
    pub fn restores_stock(&self) -> bool {
        self.status == OrderStatus::Cancelled
            && matches!(self.from, Some(OrderStatus::Pending) | Some(OrderStatus::Processing))
    }
}
