use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Only buyers with a delivered order for product {0} may review it")]
    NotEligible(Uuid),

    #[error("Not allowed to modify this review")]
    Forbidden,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("Review not found: {0}")]
    ReviewNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReviewError {
    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::NotEligible(_) => "NotEligible",
            ReviewError::Forbidden => "Forbidden",
            ReviewError::ProductNotFound(_) => "ProductNotFound",
            ReviewError::Validation(_) => "ValidationError",
            ReviewError::ReviewNotFound(_) => "ReviewNotFound",
            ReviewError::Store(StoreError::Conflict(_)) => "Conflict",
            ReviewError::Store(_) => "StoreError",
        }
    }
}
