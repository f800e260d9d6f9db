use crate::store::StoreError;

// ============================================================================
// Account Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("last_four must be exactly four digits, got {0:?}")]
    InvalidLastFour(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
