use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::Store;
use super::errors::AccountError;
use super::value_objects::{Address, PaymentMethod, PaymentMethodType, User};

// ============================================================================
// Payment Method Service
// ============================================================================
//
// Switching the default payment method is an explicit operation: the old
// default is cleared and the new method inserted inside one transaction.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub method_type: PaymentMethodType,
    pub last_four: Option<String>,
    pub is_default: bool,
}

pub struct AccountService {
    store: Arc<dyn Store>,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_addresses(&self, user: &User) -> Result<Vec<Address>, AccountError> {
        Ok(self.store.list_addresses(user.id).await?)
    }

    /// Payment methods of the user, default first
    pub async fn list_payment_methods(&self, user: &User) -> Result<Vec<PaymentMethod>, AccountError> {
        let mut methods = self.store.list_payment_methods(user.id).await?;
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(methods)
    }

    pub async fn add_payment_method(
        &self,
        user: &User,
        new_method: NewPaymentMethod,
    ) -> Result<PaymentMethod, AccountError> {
        if let Some(last_four) = &new_method.last_four {
            if last_four.len() != 4 || !last_four.chars().all(|c| c.is_ascii_digit()) {
                return Err(AccountError::InvalidLastFour(last_four.clone()));
            }
        }

        let method = PaymentMethod {
            id: Uuid::now_v7(),
            user_id: user.id,
            method_type: new_method.method_type,
            last_four: new_method.last_four,
            is_default: new_method.is_default,
            created_at: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        if method.is_default {
            let cleared = tx.clear_default_payment_methods(user.id).await?;
            tracing::debug!(user_id = %user.id, cleared = cleared, "Cleared previous default payment methods");
        }
        tx.insert_payment_method(&method).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            payment_method_id = %method.id,
            is_default = method.is_default,
            "Payment method added"
        );

        Ok(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_new_default_replaces_previous_default() {
        let store = InMemoryStore::new();
        let fixture = store.seed_demo().await;
        let service = AccountService::new(Arc::new(store.clone()));

        let added = service
            .add_payment_method(
                &fixture.consumer,
                NewPaymentMethod {
                    method_type: PaymentMethodType::DebitCard,
                    last_four: Some("4242".to_string()),
                    is_default: true,
                },
            )
            .await
            .unwrap();

        let methods = service.list_payment_methods(&fixture.consumer).await.unwrap();
        let defaults: Vec<_> = methods.iter().filter(|m| m.is_default).collect();

        assert_eq!(methods.len(), 2);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, added.id);
        assert_eq!(methods[0].id, added.id);
    }

    #[tokio::test]
    async fn test_non_default_method_keeps_existing_default() {
        let store = InMemoryStore::new();
        let fixture = store.seed_demo().await;
        let service = AccountService::new(Arc::new(store.clone()));

        service
            .add_payment_method(
                &fixture.consumer,
                NewPaymentMethod {
                    method_type: PaymentMethodType::BankTransfer,
                    last_four: None,
                    is_default: false,
                },
            )
            .await
            .unwrap();

        let methods = service.list_payment_methods(&fixture.consumer).await.unwrap();
        assert_eq!(methods[0].id, fixture.payment_method.id);
        assert!(methods[0].is_default);
        assert!(!methods[1].is_default);
    }

    #[tokio::test]
    async fn test_malformed_last_four_is_rejected() {
        let store = InMemoryStore::new();
        let fixture = store.seed_demo().await;
        let service = AccountService::new(Arc::new(store.clone()));

        let result = service
            .add_payment_method(
                &fixture.consumer,
                NewPaymentMethod {
                    method_type: PaymentMethodType::CreditCard,
                    last_four: Some("42a2".to_string()),
                    is_default: false,
                },
            )
            .await;

        assert!(matches!(result, Err(AccountError::InvalidLastFour(_))));
        assert_eq!(service.list_payment_methods(&fixture.consumer).await.unwrap().len(), 1);
    }
}
