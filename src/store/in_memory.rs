use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::account::{Address, PaymentMethod, PaymentMethodType, Role, User};
use crate::domain::catalog::{Product, Reservation};
use crate::domain::order::{sort_newest_first, Order, OrderFilter, OrderStatus, OrderStatusChanged};
use crate::domain::review::Review;
use super::{Store, StoreError, StoreTx};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// A transaction owns the state mutex for its whole lifetime. Rows it writes
// are copied into a staging area and read back from there; commit merges
// them into the committed state, drop throws them away. Transactions
// therefore run one at a time. Meant for development and tests.
//
// ============================================================================

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    addresses: HashMap<Uuid, Address>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
    orders: HashMap<Uuid, Order>,
    reviews: HashMap<Uuid, Review>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn insert_address(&self, address: Address) {
        self.state.lock().await.addresses.insert(address.id, address);
    }

    pub async fn insert_payment_method(&self, method: PaymentMethod) {
        self.state.lock().await.payment_methods.insert(method.id, method);
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Load a small marketplace: one seller with three products, two buyers
    /// with an address and a default payment method each, and an admin.
    pub async fn seed_demo(&self) -> DemoFixture {
        let consumer = User::new("buyer@example.com", Role::Consumer);
        let other_consumer = User::new("second.buyer@example.com", Role::Consumer);
        let seller = User::new("seller@example.com", Role::Seller);
        let admin = User::new("admin@example.com", Role::Admin);

        let products = vec![
            Product::new(seller.id, "Hand-thrown mug", Decimal::new(2450, 2), 5),
            Product::new(seller.id, "Ground coffee 250g", Decimal::new(899, 2), 20),
            Product::new(seller.id, "Pour-over kettle", Decimal::new(5900, 2), 3),
        ];

        let address = demo_address(consumer.id, "12 Harbour Road");
        let other_address = demo_address(other_consumer.id, "7 Mill Lane");
        let payment_method = demo_payment_method(consumer.id, "4242");
        let other_payment_method = demo_payment_method(other_consumer.id, "1881");

        for user in [&consumer, &other_consumer, &seller, &admin] {
            self.insert_user(user.clone()).await;
        }
        for product in &products {
            self.insert_product(product.clone()).await;
        }
        for address in [&address, &other_address] {
            self.insert_address(address.clone()).await;
        }
        for method in [&payment_method, &other_payment_method] {
            self.insert_payment_method(method.clone()).await;
        }

        DemoFixture {
            consumer,
            other_consumer,
            seller,
            admin,
            products,
            address,
            other_address,
            payment_method,
            other_payment_method,
        }
    }
}

/// Everything `seed_demo` created, for tests and for logging the demo ids
#[derive(Debug, Clone)]
pub struct DemoFixture {
    pub consumer: User,
    pub other_consumer: User,
    pub seller: User,
    pub admin: User,
    pub products: Vec<Product>,
    pub address: Address,
    pub other_address: Address,
    pub payment_method: PaymentMethod,
    pub other_payment_method: PaymentMethod,
}

fn demo_address(user_id: Uuid, line: &str) -> Address {
    Address {
        id: Uuid::now_v7(),
        user_id,
        label: "Home".to_string(),
        line: line.to_string(),
        city: "Portsmouth".to_string(),
        postal_code: "PO1 2AB".to_string(),
        is_default: true,
    }
}

fn demo_payment_method(user_id: Uuid, last_four: &str) -> PaymentMethod {
    PaymentMethod {
        id: Uuid::now_v7(),
        user_id,
        method_type: PaymentMethodType::CreditCard,
        last_four: Some(last_four.to_string()),
        is_default: true,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTx { guard, staged: Staged::default() }))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError> {
        let state = self.state.lock().await;
        let mut addresses: Vec<Address> = state
            .addresses
            .values()
            .filter(|a| a.belongs_to(user_id))
            .cloned()
            .collect();
        addresses.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.id.cmp(&b.id)));
        Ok(addresses)
    }

    async fn list_payment_methods(&self, user_id: Uuid) -> Result<Vec<PaymentMethod>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payment_methods
            .values()
            .filter(|m| m.belongs_to(user_id))
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn has_delivered_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.values().any(|order| {
            order.user_id == user_id
                && order.status == OrderStatus::Delivered
                && order.contains_product(product_id)
        }))
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        Ok(self.state.lock().await.reviews.get(&id).cloned())
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let state = self.state.lock().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(reviews)
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: Staged,
}

/// Rows written by an open transaction
#[derive(Default)]
struct Staged {
    products: HashMap<Uuid, Product>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
    orders: HashMap<Uuid, Order>,
    // None marks a deleted review
    reviews: HashMap<Uuid, Option<Review>>,
}

/// Copy a committed row into the staging map on first write
fn stage<'a, T: Clone>(staged: &'a mut HashMap<Uuid, T>, committed: &HashMap<Uuid, T>, id: Uuid) -> Option<&'a mut T> {
    if !staged.contains_key(&id) {
        let row = committed.get(&id)?.clone();
        staged.insert(id, row);
    }
    staged.get_mut(&id)
}

impl InMemoryTx {
    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product, StoreError> {
        stage(&mut self.staged.products, &self.guard.products, id)
            .ok_or(StoreError::MissingRow { entity: "product", id })
    }

    fn default_payment_methods(&self, user_id: Uuid) -> Vec<Uuid> {
        let staged = self.staged.payment_methods.values();
        let committed = self
            .guard
            .payment_methods
            .values()
            .filter(|m| !self.staged.payment_methods.contains_key(&m.id));

        staged
            .chain(committed)
            .filter(|m| m.belongs_to(user_id) && m.is_default)
            .map(|m| m.id)
            .collect()
    }

    fn review_exists(&self, id: Uuid) -> bool {
        match self.staged.reviews.get(&id) {
            Some(row) => row.is_some(),
            None => self.guard.reviews.contains_key(&id),
        }
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.staged.products.get(&id).or_else(|| self.guard.products.get(&id)).cloned())
    }

    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<Reservation, StoreError> {
        let product = self.product_mut(id)?;
        let reservation = Reservation::evaluate(product.stock, quantity);
        if let Reservation::Reserved { remaining } = reservation {
            product.stock = remaining;
        }
        Ok(reservation)
    }

    async fn increment_stock(&mut self, id: Uuid, quantity: i32) -> Result<i32, StoreError> {
        let product = self.product_mut(id)?;
        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or_else(|| StoreError::Conflict(format!("stock overflow for product {}", id)))?;
        Ok(product.stock)
    }

    async fn get_address(&mut self, id: Uuid) -> Result<Option<Address>, StoreError> {
        Ok(self.guard.addresses.get(&id).cloned())
    }

    async fn get_payment_method(&mut self, id: Uuid) -> Result<Option<PaymentMethod>, StoreError> {
        Ok(self
            .staged
            .payment_methods
            .get(&id)
            .or_else(|| self.guard.payment_methods.get(&id))
            .cloned())
    }

    async fn clear_default_payment_methods(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let defaults = self.default_payment_methods(user_id);
        for id in &defaults {
            if let Some(method) = stage(&mut self.staged.payment_methods, &self.guard.payment_methods, *id) {
                method.is_default = false;
            }
        }
        Ok(defaults.len() as u64)
    }

    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<(), StoreError> {
        if method.is_default && !self.default_payment_methods(method.user_id).is_empty() {
            return Err(StoreError::Conflict(format!(
                "user {} already has a default payment method",
                method.user_id
            )));
        }
        self.staged.payment_methods.insert(method.id, method.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.staged.orders.contains_key(&order.id) || self.guard.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.staged.orders.get(&id).or_else(|| self.guard.orders.get(&id)).cloned())
    }

    async fn append_status_change(&mut self, change: &OrderStatusChanged) -> Result<(), StoreError> {
        let order = stage(&mut self.staged.orders, &self.guard.orders, change.order_id)
            .ok_or(StoreError::MissingRow { entity: "order", id: change.order_id })?;

        if Some(order.status) != change.from {
            return Err(StoreError::Conflict(format!(
                "order {} is {}, expected {:?}",
                order.id, order.status, change.from
            )));
        }

        order.apply(change);
        Ok(())
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError> {
        self.staged.reviews.insert(review.id, Some(review.clone()));
        Ok(())
    }

    async fn update_review(&mut self, review: &Review) -> Result<(), StoreError> {
        if !self.review_exists(review.id) {
            return Err(StoreError::MissingRow { entity: "review", id: review.id });
        }
        self.staged.reviews.insert(review.id, Some(review.clone()));
        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let existed = self.review_exists(id);
        if existed {
            self.staged.reviews.insert(id, None);
        }
        Ok(existed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, staged } = *self;

        guard.products.extend(staged.products);
        guard.payment_methods.extend(staged.payment_methods);
        guard.orders.extend(staged.orders);
        for (id, review) in staged.reviews {
            match review {
                Some(review) => {
                    guard.reviews.insert(id, review);
                }
                None => {
                    guard.reviews.remove(&id);
                }
            }
        }
        Ok(())
    }
}
