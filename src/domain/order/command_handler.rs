use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::account::User;
use crate::domain::catalog::Reservation;
use crate::metrics::Metrics;
use crate::store::{Store, StoreTx};

use super::aggregate::{Order, PricedLine};
use super::commands::{ChangeStatus, PlaceOrder};
use super::errors::OrderError;

// ============================================================================
// Order Engine
// ============================================================================
//
// Orchestrates: Command → Store transaction → Aggregate → Commit
//
// Every write runs inside one `StoreTx`. Returning early drops the
// transaction, which rolls back every stock movement made so far.
//
// ============================================================================

pub struct OrderEngine {
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Reserve stock, snapshot prices and persist a new pending order
    pub async fn create_order(&self, user: &User, command: PlaceOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.place(user, &command).await;
        self.metrics.observe_operation("create_order", started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                let units: i32 = order.items.iter().map(|item| item.quantity).sum();
                self.metrics.record_order_created(units);

                tracing::info!(
                    order_id = %order.id,
                    user_id = %user.id,
                    item_count = order.items.len(),
                    total_amount = %order.total_amount,
                    "✅ Order placed"
                );
            }
            Err(error) => {
                self.metrics.record_order_rejected(error.code());

                tracing::warn!(
                    user_id = %user.id,
                    error = %error,
                    "Order rejected"
                );
            }
        }

        result
    }

    async fn place(&self, user: &User, command: &PlaceOrder) -> Result<Order, OrderError> {
        let lines = command.normalized_lines()?;

        let mut tx = self.store.begin().await?;

        match tx.get_address(command.shipping_address_id).await? {
            Some(address) if address.belongs_to(user.id) => {}
            _ => return Err(OrderError::InvalidAddress(command.shipping_address_id)),
        }

        match tx.get_payment_method(command.payment_method_id).await? {
            Some(method) if method.belongs_to(user.id) => {}
            _ => return Err(OrderError::InvalidPaymentMethod(command.payment_method_id)),
        }

        // Lines are sorted by product id, so rows are locked in a stable order
        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = tx
                .lock_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            match tx.decrement_stock(product.id, line.quantity).await? {
                Reservation::Reserved { remaining } => {
                    tracing::debug!(
                        product_id = %product.id,
                        reserved = line.quantity,
                        remaining = remaining,
                        "Stock reserved"
                    );
                }
                Reservation::Insufficient { available } => {
                    return Err(OrderError::OutOfStock {
                        product_id: product.id,
                        requested: line.quantity,
                        available,
                    });
                }
            }

            priced.push(PricedLine::new(line, &product));
        }

        let order = Order::place(
            user.id,
            command.shipping_address_id,
            command.payment_method_id,
            &priced,
            Utc::now(),
        )?;

        tx.insert_order(&order).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Move an order along its lifecycle; cancellation restores stock
    pub async fn update_status(&self, requester: &User, command: ChangeStatus) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.transition(requester, &command).await;
        self.metrics.observe_operation("update_status", started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            tracing::warn!(
                order_id = %command.order_id,
                requester = %requester.id,
                target = %command.status,
                error = %error,
                "Status change rejected"
            );
        }

        result
    }

    async fn transition(&self, requester: &User, command: &ChangeStatus) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;

        // Row lock held until commit: transitions on one order are serialized
        let mut order = tx
            .lock_order(command.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(command.order_id))?;

        if !order.is_accessible_by(requester) {
            return Err(OrderError::Forbidden);
        }

        let change = order.transition(command.status, command.note.clone(), requester.id, Utc::now())?;

        let mut restored = 0;
        if change.restores_stock() {
            restore_stock(tx.as_mut(), &order).await?;
            restored = order.items.iter().map(|item| item.quantity).sum();
        }

        tx.append_status_change(&change).await?;
        tx.commit().await?;

        order.apply(&change);

        self.metrics.record_status_transition(
            change.from.map(|s| s.as_str()).unwrap_or("none"),
            change.status.as_str(),
        );
        if restored > 0 {
            self.metrics.record_stock_restored(restored);
        }

        tracing::info!(
            order_id = %order.id,
            from = ?change.from,
            to = %change.status,
            changed_by = %requester.id,
            restored_units = restored,
            "✅ Order status changed"
        );

        Ok(order)
    }
}

async fn restore_stock(tx: &mut dyn StoreTx, order: &Order) -> Result<(), OrderError> {
    for item in &order.items {
        let stock = tx.increment_stock(item.product_id, item.quantity).await?;
        tracing::debug!(
            order_id = %order.id,
            product_id = %item.product_id,
            restored = item.quantity,
            stock = stock,
            "Stock restored"
        );
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Role, User};
    use crate::domain::order::{OrderLine, OrderStatus};
    use crate::store::{DemoFixture, InMemoryStore, StoreError};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn setup() -> (InMemoryStore, DemoFixture, Arc<OrderEngine>) {
        let store = InMemoryStore::new();
        let fixture = store.seed_demo().await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let engine = Arc::new(OrderEngine::new(Arc::new(store.clone()), metrics));
        (store, fixture, engine)
    }

    fn order_for(fixture: &DemoFixture, lines: &[(Uuid, i32)]) -> PlaceOrder {
        PlaceOrder {
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLine { product_id: *product_id, quantity: *quantity })
                .collect(),
            shipping_address_id: fixture.address.id,
            payment_method_id: fixture.payment_method.id,
        }
    }

    async fn stock_of(store: &InMemoryStore, product_id: Uuid) -> i32 {
        store.get_product(product_id).await.unwrap().unwrap().stock
    }

    fn change(order_id: Uuid, status: OrderStatus) -> ChangeStatus {
        ChangeStatus { order_id, status, note: None }
    }

    #[tokio::test]
    async fn test_stock_boundary_scenario() {
        let (store, fixture, engine) = setup().await;
        let product = &fixture.products[0]; // stock 5
        assert_eq!(product.stock, 5);

        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(product.id, 3)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, product.price * Decimal::from(3));
        assert_eq!(stock_of(&store, product.id).await, 2);

        let second = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(product.id, 3)]))
            .await;

        assert!(matches!(
            second,
            Err(OrderError::OutOfStock { requested: 3, available: 2, .. })
        ));
        assert_eq!(stock_of(&store, product.id).await, 2);
    }

    #[tokio::test]
    async fn test_total_matches_line_items() {
        let (_store, fixture, engine) = setup().await;

        let order = engine
            .create_order(
                &fixture.consumer,
                order_for(&fixture, &[(fixture.products[0].id, 2), (fixture.products[1].id, 4)]),
            )
            .await
            .unwrap();

        let expected: Decimal = order
            .items
            .iter()
            .map(|item| item.price_at_time * Decimal::from(item.quantity))
            .sum();
        assert_eq!(order.total_amount, expected);
        assert_eq!(order.items.len(), 2);
    }

    #[tokio::test]
    async fn test_later_line_out_of_stock_rolls_back_earlier_lines() {
        let (store, fixture, engine) = setup().await;
        let plenty = &fixture.products[1];
        let scarce = &fixture.products[0];
        let before = stock_of(&store, plenty.id).await;

        let result = engine
            .create_order(
                &fixture.consumer,
                order_for(&fixture, &[(plenty.id, 2), (scarce.id, scarce.stock + 1)]),
            )
            .await;

        assert!(matches!(result, Err(OrderError::OutOfStock { .. })));
        assert_eq!(stock_of(&store, plenty.id).await, before);
        assert_eq!(stock_of(&store, scarce.id).await, scarce.stock);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_product_is_rejected() {
        let (store, fixture, engine) = setup().await;
        let missing = Uuid::now_v7();

        let result = engine
            .create_order(
                &fixture.consumer,
                order_for(&fixture, &[(fixture.products[1].id, 1), (missing, 1)]),
            )
            .await;

        assert!(matches!(result, Err(OrderError::ProductNotFound(id)) if id == missing));
        assert_eq!(stock_of(&store, fixture.products[1].id).await, fixture.products[1].stock);
    }

    #[tokio::test]
    async fn test_foreign_address_and_payment_method_are_rejected() {
        let (_store, fixture, engine) = setup().await;
        let product = &fixture.products[1];

        let mut command = order_for(&fixture, &[(product.id, 1)]);
        command.shipping_address_id = fixture.other_address.id;
        let result = engine.create_order(&fixture.consumer, command).await;
        assert!(matches!(result, Err(OrderError::InvalidAddress(_))));

        let mut command = order_for(&fixture, &[(product.id, 1)]);
        command.payment_method_id = fixture.other_payment_method.id;
        let result = engine.create_order(&fixture.consumer, command).await;
        assert!(matches!(result, Err(OrderError::InvalidPaymentMethod(_))));

        let mut command = order_for(&fixture, &[(product.id, 1)]);
        command.payment_method_id = Uuid::now_v7();
        let result = engine.create_order(&fixture.consumer, command).await;
        assert!(matches!(result, Err(OrderError::InvalidPaymentMethod(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_never_oversell() {
        let (store, fixture, engine) = setup().await;
        let product = fixture.products[0].clone(); // stock 5

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let consumer = fixture.consumer.clone();
            let command = order_for(&fixture, &[(product.id, 3)]);
            handles.push(tokio::spawn(async move { engine.create_order(&consumer, command).await }));
        }

        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let out_of_stock = results
            .iter()
            .filter(|r| matches!(r, Err(OrderError::OutOfStock { .. })))
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(out_of_stock, 1);
        assert_eq!(stock_of(&store, product.id).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_orders_sell_exactly_the_stock() {
        let (store, fixture, engine) = setup().await;
        let product = fixture.products[1].clone();
        let attempts = product.stock + 7;

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let engine = engine.clone();
                let consumer = fixture.consumer.clone();
                let command = order_for(&fixture, &[(product.id, 1)]);
                tokio::spawn(async move { engine.create_order(&consumer, command).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(OrderError::OutOfStock { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(succeeded, product.stock);
        assert_eq!(stock_of(&store, product.id).await, 0);
    }

    #[tokio::test]
    async fn test_full_lifecycle_then_illegal_rewind() {
        let (_store, fixture, engine) = setup().await;
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(fixture.products[1].id, 1)]))
            .await
            .unwrap();

        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            let updated = engine
                .update_status(&fixture.seller, change(order.id, status))
                .await
                .unwrap();
            assert_eq!(updated.status, status);
        }

        let result = engine
            .update_status(&fixture.seller, change(order.id, OrderStatus::Pending))
            .await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Pending })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_restores_stock_exactly_once() {
        let (store, fixture, engine) = setup().await;
        let a = &fixture.products[0];
        let b = &fixture.products[1];

        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(a.id, 2), (b.id, 3)]))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, a.id).await, a.stock - 2);

        engine
            .update_status(&fixture.consumer, change(order.id, OrderStatus::Processing))
            .await
            .unwrap();
        let cancelled = engine
            .update_status(&fixture.consumer, change(order.id, OrderStatus::Cancelled))
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, a.id).await, a.stock);
        assert_eq!(stock_of(&store, b.id).await, b.stock);

        let again = engine
            .update_status(&fixture.consumer, change(order.id, OrderStatus::Cancelled))
            .await;
        assert!(matches!(again, Err(OrderError::InvalidTransition { .. })));
        assert_eq!(stock_of(&store, a.id).await, a.stock);
        assert_eq!(stock_of(&store, b.id).await, b.stock);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cancels_apply_once() {
        let (store, fixture, engine) = setup().await;
        let product = fixture.products[1].clone(); // stock 20
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(product.id, 4)]))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, product.id).await, product.stock - 4);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let consumer = fixture.consumer.clone();
                let command = change(order.id, OrderStatus::Cancelled);
                tokio::spawn(async move { engine.update_status(&consumer, command).await })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => applied += 1,
                Err(OrderError::InvalidTransition { .. }) | Err(OrderError::Store(StoreError::Conflict(_))) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(stock_of(&store, product.id).await, product.stock);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        let cancels = stored
            .history
            .iter()
            .filter(|entry| entry.status == OrderStatus::Cancelled)
            .count();
        assert_eq!(cancels, 1);
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_be_cancelled() {
        let (store, fixture, engine) = setup().await;
        let product = &fixture.products[1];
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(product.id, 1)]))
            .await
            .unwrap();

        engine.update_status(&fixture.admin, change(order.id, OrderStatus::Processing)).await.unwrap();
        engine.update_status(&fixture.admin, change(order.id, OrderStatus::Shipped)).await.unwrap();

        let result = engine
            .update_status(&fixture.admin, change(order.id, OrderStatus::Cancelled))
            .await;
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
        assert_eq!(stock_of(&store, product.id).await, product.stock - 1);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_order_unchanged() {
        let (store, fixture, engine) = setup().await;
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(fixture.products[1].id, 1)]))
            .await
            .unwrap();
        let before = store.get_order(order.id).await.unwrap().unwrap();

        let stranger = User::new("stranger@example.com", Role::Consumer);
        let forbidden = engine
            .update_status(&stranger, change(order.id, OrderStatus::Cancelled))
            .await;
        assert!(matches!(forbidden, Err(OrderError::Forbidden)));

        let invalid = engine
            .update_status(&fixture.consumer, change(order.id, OrderStatus::Shipped))
            .await;
        assert!(matches!(invalid, Err(OrderError::InvalidTransition { .. })));

        let after = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_unrelated_seller_is_forbidden() {
        let (store, fixture, engine) = setup().await;
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(fixture.products[1].id, 1)]))
            .await
            .unwrap();

        let other_seller = User::new("rival@example.com", Role::Seller);
        store.insert_user(other_seller.clone()).await;

        let result = engine
            .update_status(&other_seller, change(order.id, OrderStatus::Processing))
            .await;
        assert!(matches!(result, Err(OrderError::Forbidden)));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (_store, fixture, engine) = setup().await;
        let missing = Uuid::now_v7();

        let result = engine
            .update_status(&fixture.admin, change(missing, OrderStatus::Processing))
            .await;
        assert!(matches!(result, Err(OrderError::OrderNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_history_tracks_every_transition() {
        let (store, fixture, engine) = setup().await;
        let order = engine
            .create_order(&fixture.consumer, order_for(&fixture, &[(fixture.products[1].id, 1)]))
            .await
            .unwrap();

        engine
            .update_status(
                &fixture.seller,
                ChangeStatus {
                    order_id: order.id,
                    status: OrderStatus::Processing,
                    note: Some("picked".to_string()),
                },
            )
            .await
            .unwrap();

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        let statuses: Vec<_> = stored.history.iter().map(|h| h.status).collect();

        assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Processing]);
        assert_eq!(stored.history[1].note.as_deref(), Some("picked"));
        assert_eq!(stored.history[1].changed_by, fixture.seller.id);
        assert_eq!(stored.status, stored.history.last().unwrap().status);
    }
}
