use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::account::{Role, User};
use crate::domain::catalog::Product;
use super::errors::OrderError;
use super::events::OrderStatusChanged;
use super::value_objects::{OrderLine, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Key rules:
// 1. total_amount is derived from the line items at placement, never set
// 2. price_at_time is copied from the product when the order is placed
// 3. status only changes through `transition` + `apply`
// 4. history is append-only and its last entry is the current status
//
// ============================================================================

/// A requested line joined with the product row it was reserved against
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn new(line: &OrderLine, product: &Product) -> Self {
        Self {
            product_id: product.id,
            seller_id: product.seller_id,
            quantity: line.quantity,
            unit_price: product.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub order_id: Uuid,
    pub product_id: Uuid,
    #[serde(skip_serializing)]
    pub seller_id: Uuid,
    pub quantity: i32,
    #[serde(rename = "price", with = "rust_decimal::serde::float")]
    pub price_at_time: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price_at_time * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub user_id: Uuid,

    // Current state
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,

    // Audit trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // References kept as metadata
    pub shipping_address_id: Uuid,
    #[serde(rename = "payment_method")]
    pub payment_method_id: Uuid,

    pub items: Vec<OrderItem>,
    #[serde(rename = "status_history")]
    pub history: Vec<OrderStatusChanged>,
}

impl Order {
    /// Build a new pending order from lines whose stock is already reserved
    pub fn place(
        user_id: Uuid,
        shipping_address_id: Uuid,
        payment_method_id: Uuid,
        lines: &[PricedLine],
        at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::Validation("order must contain at least one item".to_string()));
        }

        let id = Uuid::now_v7();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::now_v7(),
                order_id: id,
                product_id: line.product_id,
                seller_id: line.seller_id,
                quantity: line.quantity,
                price_at_time: line.unit_price,
            })
            .collect();

        let total_amount = items.iter().map(OrderItem::line_total).sum();

        Ok(Self {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            created_at: at,
            updated_at: at,
            shipping_address_id,
            payment_method_id,
            items,
            history: vec![OrderStatusChanged::placed(id, user_id, at)],
        })
    }

    /// Validate a status change and describe it, without mutating the order
    pub fn transition(
        &self,
        next: OrderStatus,
        note: Option<String>,
        changed_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<OrderStatusChanged, OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        Ok(OrderStatusChanged {
            id: Uuid::now_v7(),
            order_id: self.id,
            from: Some(self.status),
            status: next,
            note,
            changed_by,
            changed_at: at,
        })
    }

    pub fn apply(&mut self, change: &OrderStatusChanged) {
        self.status = change.status;
        self.updated_at = change.changed_at;
        self.history.push(change.clone());
    }

    pub fn contains_product(&self, product_id: Uuid) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }

    pub fn involves_seller(&self, seller_id: Uuid) -> bool {
        self.items.iter().any(|item| item.seller_id == seller_id)
    }

    /// Owner, admins, and sellers with a product on the order
    pub fn is_accessible_by(&self, user: &User) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Seller => self.user_id == user.id || self.involves_seller(user.id),
            Role::Consumer => self.user_id == user.id,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
