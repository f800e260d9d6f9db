use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::account::{Address, PaymentMethod, User};
use crate::domain::catalog::{Product, Reservation};
use crate::domain::order::{Order, OrderFilter, OrderStatusChanged};
use crate::domain::review::Review;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{DemoFixture, InMemoryStore};
pub use postgres::PgStore;

// ============================================================================
// Storage Seam
// ============================================================================
//
// Two backends implement the same contract:
// - `PgStore`: PostgreSQL through sqlx, row locks via SELECT ... FOR UPDATE
// - `InMemoryStore`: one mutex-guarded state, transactions are serializable
//
// Every write goes through a `StoreTx`. Dropping a transaction without
// calling `commit` discards everything it staged.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("{entity} {id} disappeared during the transaction")]
    MissingRow { entity: &'static str, id: Uuid },
}

/// Read access plus the entry point for transactional writes
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError>;

    async fn list_payment_methods(&self, user_id: Uuid) -> Result<Vec<PaymentMethod>, StoreError>;

    /// Order with items and full status history
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Matching orders, newest first
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// True when the user owns a delivered order containing the product
    async fn has_delivered_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError>;

    /// Reviews of a product, newest first
    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError>;
}

/// One unit of work. Changes become visible on `commit`.
#[async_trait]
pub trait StoreTx: Send {
    // ---- catalog ----

    /// Read a product and hold its row until the transaction ends
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Take `quantity` units if available; leaves stock untouched otherwise
    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<Reservation, StoreError>;

    /// Put units back and return the new stock level
    async fn increment_stock(&mut self, id: Uuid, quantity: i32) -> Result<i32, StoreError>;

    // ---- accounts ----

    async fn get_address(&mut self, id: Uuid) -> Result<Option<Address>, StoreError>;

    async fn get_payment_method(&mut self, id: Uuid) -> Result<Option<PaymentMethod>, StoreError>;

    /// Unset the default flag on every payment method of the user
    async fn clear_default_payment_methods(&mut self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<(), StoreError>;

    // ---- orders ----

    /// Persist an order together with its items and initial history
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Read an order and hold its row until the transaction ends
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Write a new status, conditional on the order still being in `change.from`.
    /// Fails with `StoreError::Conflict` when another writer got there first.
    async fn append_status_change(&mut self, change: &OrderStatusChanged) -> Result<(), StoreError>;

    // ---- reviews ----

    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError>;

    async fn update_review(&mut self, review: &Review) -> Result<(), StoreError>;

    /// Returns false when no review with this id existed
    async fn delete_review(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
