use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::account::{Role, User};
use crate::store::Store;
use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Query Service - Read side of the order lifecycle
// ============================================================================

/// Which orders a listing may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Orders placed by this user
    Owner(Uuid),
    /// Orders containing at least one product of this seller
    Seller(Uuid),
    /// Every order (admins)
    All,
}

/// Listing scope requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedScope {
    #[default]
    Own,
    Seller,
    All,
}

/// Store-level filter. `from`/`to` are inclusive bounds on `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFilter {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let in_scope = match self.scope {
            OrderScope::Owner(user_id) => order.user_id == user_id,
            OrderScope::Seller(seller_id) => order.involves_seller(seller_id),
            OrderScope::All => true,
        };

        in_scope
            && self.status.map_or(true, |status| order.status == status)
            && self.from.map_or(true, |from| order.created_at >= from)
            && self.to.map_or(true, |to| order.created_at <= to)
    }
}

/// Newest first; ids are time-ordered so they break timestamp ties
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[derive(Debug, Clone, Default)]
pub struct OrderCriteria {
    pub scope: RequestedScope,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub struct OrderQueryService {
    store: Arc<dyn Store>,
}

impl OrderQueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_orders(&self, requester: &User, criteria: OrderCriteria) -> Result<Vec<Order>, OrderError> {
        if let (Some(from), Some(to)) = (criteria.from, criteria.to) {
            if from > to {
                return Err(OrderError::Validation("from_date must not be after to_date".to_string()));
            }
        }

        let scope = match (criteria.scope, requester.role) {
            (RequestedScope::Own, _) => OrderScope::Owner(requester.id),
            (RequestedScope::Seller, Role::Seller) => OrderScope::Seller(requester.id),
            (RequestedScope::All, Role::Admin) => OrderScope::All,
            _ => return Err(OrderError::Forbidden),
        };

        let filter = OrderFilter {
            scope,
            status: criteria.status,
            from: criteria.from,
            to: criteria.to,
        };

        let orders = self.store.list_orders(&filter).await?;

        tracing::debug!(
            requester = %requester.id,
            scope = ?filter.scope,
            count = orders.len(),
            "Listed orders"
        );

        Ok(orders)
    }

    /// Orders the requester may not see are reported as missing
    pub async fn get_order(&self, requester: &User, order_id: Uuid) -> Result<Order, OrderError> {
        match self.store.get_order(order_id).await? {
            Some(order) if order.is_accessible_by(requester) => Ok(order),
            _ => Err(OrderError::OrderNotFound(order_id)),
        }
    }
}
