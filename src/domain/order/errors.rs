use uuid::Uuid;

use crate::store::StoreError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Out of stock for product {product_id}: requested {requested}, available {available}")]
    OutOfStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Shipping address {0} does not belong to the requesting user")]
    InvalidAddress(Uuid),

    #[error("Payment method {0} does not belong to the requesting user")]
    InvalidPaymentMethod(Uuid),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not allowed to access this order")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Stable error name used in API bodies and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::ProductNotFound(_) => "ProductNotFound",
            OrderError::OutOfStock { .. } => "OutOfStock",
            OrderError::InvalidAddress(_) => "InvalidAddress",
            OrderError::InvalidPaymentMethod(_) => "InvalidPaymentMethod",
            OrderError::InvalidTransition { .. } => "InvalidTransition",
            OrderError::Forbidden => "Forbidden",
            OrderError::Validation(_) => "ValidationError",
            OrderError::OrderNotFound(_) => "OrderNotFound",
            OrderError::Store(StoreError::Conflict(_)) => "Conflict",
            OrderError::Store(_) => "StoreError",
        }
    }
}
