use std::sync::Arc;
use uuid::Uuid;

use crate::store::{Store, StoreError};

/// Purchase check in front of review writes
pub struct ReviewGate {
    store: Arc<dyn Store>,
}

impl ReviewGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// True iff the user owns a delivered order containing the product
    pub async fn can_review(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        self.store.has_delivered_item(user_id, product_id).await
    }
}
