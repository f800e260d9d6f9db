use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Catalog Value Objects
// ============================================================================

/// A sellable product together with its current stock level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock: i32,
}

impl Product {
    pub fn new(seller_id: Uuid, name: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            seller_id,
            name: name.into(),
            price,
            stock,
        }
    }
}

/// Outcome of a stock decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Stock was taken; `remaining` is what is left on the shelf
    Reserved { remaining: i32 },
    /// Nothing was taken because fewer than the requested units are available
    Insufficient { available: i32 },
}

impl Reservation {
    /// Reservation rule shared by every store backend
    pub fn evaluate(stock: i32, quantity: i32) -> Self {
        if quantity <= stock {
            Reservation::Reserved { remaining: stock - quantity }
        } else {
            Reservation::Insufficient { available: stock }
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved { .. })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
