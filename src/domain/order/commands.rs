use std::collections::BTreeMap;
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{OrderLine, OrderStatus};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub items: Vec<OrderLine>,
    pub shipping_address_id: Uuid,
    pub payment_method_id: Uuid,
}

impl PlaceOrder {
    /// Validated lines, one per product, in ascending product id order.
    ///
    /// Stock rows are locked in this order so that two overlapping orders
    /// never wait on each other's locks.
    pub fn normalized_lines(&self) -> Result<Vec<OrderLine>, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("order must contain at least one item".to_string()));
        }

        let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &self.items {
            if line.quantity < 1 {
                return Err(OrderError::Validation(format!(
                    "quantity for product {} must be at least 1, got {}",
                    line.product_id, line.quantity
                )));
            }

            let quantity = merged.entry(line.product_id).or_insert(0);
            *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
                OrderError::Validation(format!("quantity for product {} is too large", line.product_id))
            })?;
        }

        Ok(merged
            .into_iter()
            .map(|(product_id, quantity)| OrderLine { product_id, quantity })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(items: Vec<OrderLine>) -> PlaceOrder {
        PlaceOrder {
            items,
            shipping_address_id: Uuid::now_v7(),
            payment_method_id: Uuid::now_v7(),
        }
    }

    #[test]
    fn test_duplicate_products_are_merged_and_sorted() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let command = place(vec![
            OrderLine { product_id: b, quantity: 1 },
            OrderLine { product_id: a, quantity: 2 },
            OrderLine { product_id: b, quantity: 4 },
        ]);

        let lines = command.normalized_lines().unwrap();
        assert_eq!(
            lines,
            vec![
                OrderLine { product_id: a, quantity: 2 },
                OrderLine { product_id: b, quantity: 5 },
            ]
        );
    }

    #[test]
    fn test_empty_order_is_rejected() {
        assert!(matches!(place(vec![]).normalized_lines(), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_non_positive_quantity_is_rejected() {
        let command = place(vec![OrderLine { product_id: Uuid::now_v7(), quantity: 0 }]);
        assert!(matches!(command.normalized_lines(), Err(OrderError::Validation(_))));

        let command = place(vec![OrderLine { product_id: Uuid::now_v7(), quantity: -2 }]);
        assert!(matches!(command.normalized_lines(), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_quantity_overflow_is_rejected() {
        let product_id = Uuid::now_v7();
        let command = place(vec![
            OrderLine { product_id, quantity: i32::MAX },
            OrderLine { product_id, quantity: 1 },
        ]);
        assert!(matches!(command.normalized_lines(), Err(OrderError::Validation(_))));
    }
}
