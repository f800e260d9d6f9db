use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::account::{Address, PaymentMethod, User};
use crate::domain::catalog::{Product, Reservation};
use crate::domain::order::{Order, OrderFilter, OrderItem, OrderScope, OrderStatus, OrderStatusChanged};
use crate::domain::review::Review;
use super::{Store, StoreError, StoreTx};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Concurrency model:
// - Stock rows are locked with SELECT ... FOR UPDATE before they are changed,
//   and the decrement itself is guarded by `stock >= quantity`
// - Status writes are conditional on the expected previous status, so a
//   stale writer gets `Conflict` instead of overwriting
// - Everything runs at the default READ COMMITTED isolation level
//
// ============================================================================

const SCHEMA: &str = include_str!("../../migrations/schema.sql");

const ORDER_COLUMNS: &str =
    "o.id, o.user_id, o.status, o.total_amount, o.shipping_address_id, o.payment_method_id, o.created_at, o.updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to PostgreSQL");

        Ok(Self::new(pool))
    }

    /// Create missing tables and indexes
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, seller_id, name, price, stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, label, line, city, postal_code, is_default
             FROM addresses WHERE user_id = $1
             ORDER BY is_default DESC, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(address_from_row).collect()
    }

    async fn list_payment_methods(&self, user_id: Uuid) -> Result<Vec<PaymentMethod>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, method_type, last_four, is_default, created_at
             FROM payment_methods WHERE user_id = $1
             ORDER BY is_default DESC, created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_method_from_row).collect()
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {} FROM orders o WHERE o.id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(hydrate_orders(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let rows = order_listing(filter).build().fetch_all(&mut *conn).await?;
        hydrate_orders(&mut conn, rows).await
    }

    async fn has_delivered_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1 FROM orders o
                JOIN order_items i ON i.order_id = o.id
                WHERE o.user_id = $1 AND o.status = $2 AND i.product_id = $3
             )",
        )
        .bind(user_id)
        .bind(OrderStatus::Delivered.as_str())
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, product_id, rating, comment, created_at, updated_at
             FROM reviews WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, product_id, rating, comment, created_at, updated_at
             FROM reviews WHERE product_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(review_from_row).collect()
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_product(&mut self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, seller_id, name, price, stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn decrement_stock(&mut self, id: Uuid, quantity: i32) -> Result<Reservation, StoreError> {
        let reserved = sqlx::query(
            "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2 RETURNING stock",
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = reserved {
            return Ok(Reservation::Reserved { remaining: row.try_get("stock")? });
        }

        let current = sqlx::query("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::MissingRow { entity: "product", id })?;

        Ok(Reservation::Insufficient { available: current.try_get("stock")? })
    }

    async fn increment_stock(&mut self, id: Uuid, quantity: i32) -> Result<i32, StoreError> {
        let row = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1 RETURNING stock")
            .bind(id)
            .bind(quantity)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::MissingRow { entity: "product", id })?;

        Ok(row.try_get("stock")?)
    }

    async fn get_address(&mut self, id: Uuid) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, label, line, city, postal_code, is_default FROM addresses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(address_from_row).transpose()
    }

    async fn get_payment_method(&mut self, id: Uuid) -> Result<Option<PaymentMethod>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, method_type, last_four, is_default, created_at
             FROM payment_methods WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(payment_method_from_row).transpose()
    }

    async fn clear_default_payment_methods(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE payment_methods SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payment_methods (id, user_id, method_type, last_four, is_default, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(method.id)
        .bind(method.user_id)
        .bind(method.method_type.as_str())
        .bind(&method.last_four)
        .bind(method.is_default)
        .bind(method.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation_as_conflict(e, "user already has a default payment method"))?;

        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_amount, shipping_address_id,
                                 payment_method_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(order.shipping_address_id)
        .bind(order.payment_method_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation_as_conflict(e, "order already exists"))?;

        if !order.items.is_empty() {
            let mut items = QueryBuilder::<Postgres>::new(
                "INSERT INTO order_items (id, order_id, position, product_id, seller_id, quantity, price_at_time) ",
            );
            items.push_values(order.items.iter().enumerate(), |mut b, (position, item)| {
                b.push_bind(item.id)
                    .push_bind(item.order_id)
                    .push_bind(position as i32)
                    .push_bind(item.product_id)
                    .push_bind(item.seller_id)
                    .push_bind(item.quantity)
                    .push_bind(item.price_at_time);
            });
            items.build().execute(&mut *self.tx).await?;
        }

        for entry in &order.history {
            insert_history(&mut self.tx, entry).await?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM orders o WHERE o.id = $1 FOR UPDATE", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(hydrate_orders(&mut self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn append_status_change(&mut self, change: &OrderStatusChanged) -> Result<(), StoreError> {
        let from = change
            .from
            .ok_or_else(|| StoreError::Conflict(format!("order {} already has an initial status", change.order_id)))?;

        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4")
            .bind(change.order_id)
            .bind(change.status.as_str())
            .bind(change.changed_at)
            .bind(from.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} is no longer {}",
                change.order_id, from
            )));
        }

        insert_history(&mut self.tx, change).await
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reviews (id, user_id, product_id, rating, comment, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(review.id)
        .bind(review.user_id)
        .bind(review.product_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_review(&mut self, review: &Review) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE reviews SET rating = $2, comment = $3, updated_at = $4 WHERE id = $1")
            .bind(review.id)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(review.updated_at)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow { entity: "review", id: review.id });
        }
        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Query helpers
// ============================================================================

fn order_listing(filter: &OrderFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM orders o WHERE TRUE", ORDER_COLUMNS));

    match filter.scope {
        OrderScope::Owner(user_id) => {
            query.push(" AND o.user_id = ").push_bind(user_id);
        }
        OrderScope::Seller(seller_id) => {
            query
                .push(" AND EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.seller_id = ")
                .push_bind(seller_id)
                .push(")");
        }
        OrderScope::All => {}
    }

    if let Some(status) = filter.status {
        query.push(" AND o.status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        query.push(" AND o.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND o.created_at <= ").push_bind(to);
    }

    query.push(" ORDER BY o.created_at DESC, o.id DESC");
    query
}

async fn insert_history(conn: &mut PgConnection, entry: &OrderStatusChanged) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, from_status, status, note, changed_by, changed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(entry.id)
    .bind(entry.order_id)
    .bind(entry.from.map(|s| s.as_str()))
    .bind(entry.status.as_str())
    .bind(&entry.note)
    .bind(entry.changed_by)
    .bind(entry.changed_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Attach items and history to order header rows, keeping row order
async fn hydrate_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>, StoreError> {
    let mut orders = rows.iter().map(order_header_from_row).collect::<Result<Vec<_>, _>>()?;
    if orders.is_empty() {
        return Ok(orders);
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let index: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let item_rows = sqlx::query(
        "SELECT id, order_id, product_id, seller_id, quantity, price_at_time
         FROM order_items WHERE order_id = ANY($1)
         ORDER BY order_id, position",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    for row in &item_rows {
        let item = order_item_from_row(row)?;
        if let Some(&i) = index.get(&item.order_id) {
            orders[i].items.push(item);
        }
    }

    let history_rows = sqlx::query(
        "SELECT id, order_id, from_status, status, note, changed_by, changed_at
         FROM order_status_history WHERE order_id = ANY($1)
         ORDER BY order_id, seq",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    for row in &history_rows {
        let entry = history_from_row(row)?;
        if let Some(&i) = index.get(&entry.order_id) {
            orders[i].history.push(entry);
        }
    }

    Ok(orders)
}

fn unique_violation_as_conflict(error: sqlx::Error, detail: &str) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(detail.to_string()),
        _ => StoreError::Database(error),
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_column<T>(table: &'static str, value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(|detail| StoreError::Corrupt { table, detail })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        role: parse_column("users", &role)?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
    })
}

fn address_from_row(row: &PgRow) -> Result<Address, StoreError> {
    Ok(Address {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        label: row.try_get("label")?,
        line: row.try_get("line")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        is_default: row.try_get("is_default")?,
    })
}

fn payment_method_from_row(row: &PgRow) -> Result<PaymentMethod, StoreError> {
    let method_type: String = row.try_get("method_type")?;
    Ok(PaymentMethod {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        method_type: parse_column("payment_methods", &method_type)?,
        last_four: row.try_get("last_four")?,
        is_default: row.try_get("is_default")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_header_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status: parse_column("orders", &status)?,
        total_amount: row.try_get("total_amount")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        shipping_address_id: row.try_get("shipping_address_id")?,
        payment_method_id: row.try_get("payment_method_id")?,
        items: Vec::new(),
        history: Vec::new(),
    })
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        seller_id: row.try_get("seller_id")?,
        quantity: row.try_get("quantity")?,
        price_at_time: row.try_get("price_at_time")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<OrderStatusChanged, StoreError> {
    let from: Option<String> = row.try_get("from_status")?;
    let status: String = row.try_get("status")?;
    Ok(OrderStatusChanged {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        from: from
            .as_deref()
            .map(|s| parse_column::<OrderStatus>("order_status_history", s))
            .transpose()?,
        status: parse_column("order_status_history", &status)?,
        note: row.try_get("note")?,
        changed_by: row.try_get("changed_by")?,
        changed_at: row.try_get("changed_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review, StoreError> {
    Ok(Review {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
