use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::account::{Role, User};
use crate::store::Store;
use super::errors::ReviewError;
use super::gate::ReviewGate;
use super::value_objects::{is_valid_rating, normalize_comment, Review, MAX_RATING, MIN_RATING};

// ============================================================================
// Review Service
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewReview {
    pub rating: i16,
    pub comment: Option<String>,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default)]
pub struct ReviewChanges {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

pub struct ReviewService {
    store: Arc<dyn Store>,
    gate: ReviewGate,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            gate: ReviewGate::new(store.clone()),
            store,
        }
    }

    pub async fn create_review(
        &self,
        author: &User,
        product_id: Uuid,
        new_review: NewReview,
    ) -> Result<Review, ReviewError> {
        if author.role != Role::Consumer {
            return Err(ReviewError::Forbidden);
        }

        if self.store.get_product(product_id).await?.is_none() {
            return Err(ReviewError::ProductNotFound(product_id));
        }

        check_rating(new_review.rating)?;

        if !self.gate.can_review(author.id, product_id).await? {
            return Err(ReviewError::NotEligible(product_id));
        }

        let review = Review::new(author.id, product_id, new_review.rating, new_review.comment, Utc::now());

        let mut tx = self.store.begin().await?;
        tx.insert_review(&review).await?;
        tx.commit().await?;

        tracing::info!(
            review_id = %review.id,
            product_id = %product_id,
            user_id = %author.id,
            rating = review.rating,
            "⭐ Review created"
        );

        Ok(review)
    }

    pub async fn list_product_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, ReviewError> {
        Ok(self.store.list_reviews(product_id).await?)
    }

    pub async fn update_review(
        &self,
        author: &User,
        review_id: Uuid,
        changes: ReviewChanges,
    ) -> Result<Review, ReviewError> {
        let mut review = self.owned_review(author, review_id).await?;

        if let Some(rating) = changes.rating {
            check_rating(rating)?;
            review.rating = rating;
        }
        if changes.comment.is_some() {
            review.comment = normalize_comment(changes.comment);
        }
        review.updated_at = Utc::now();

        let mut tx = self.store.begin().await?;
        tx.update_review(&review).await?;
        tx.commit().await?;

        tracing::info!(review_id = %review.id, user_id = %author.id, "Review updated");

        Ok(review)
    }

    pub async fn delete_review(&self, author: &User, review_id: Uuid) -> Result<(), ReviewError> {
        self.owned_review(author, review_id).await?;

        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_review(review_id).await?;
        tx.commit().await?;

        if !deleted {
            return Err(ReviewError::ReviewNotFound(review_id));
        }

        tracing::info!(review_id = %review_id, user_id = %author.id, "Review deleted");

        Ok(())
    }

    async fn owned_review(&self, author: &User, review_id: Uuid) -> Result<Review, ReviewError> {
        let review = self
            .store
            .get_review(review_id)
            .await?
            .ok_or(ReviewError::ReviewNotFound(review_id))?;

        if !review.is_written_by(author.id) {
            return Err(ReviewError::Forbidden);
        }

        Ok(review)
    }
}

fn check_rating(rating: i16) -> Result<(), ReviewError> {
    if is_valid_rating(rating) {
        Ok(())
    } else {
        Err(ReviewError::Validation(format!(
            "rating must be between {} and {}, got {}",
            MIN_RATING, MAX_RATING, rating
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ChangeStatus, OrderEngine, OrderLine, OrderStatus, PlaceOrder};
    use crate::metrics::Metrics;
    use crate::store::{DemoFixture, InMemoryStore};
    use uuid::Uuid;

    async fn setup() -> (DemoFixture, OrderEngine, ReviewService) {
        let store = InMemoryStore::new();
        let fixture = store.seed_demo().await;
        let shared: Arc<dyn Store> = Arc::new(store);
        let engine = OrderEngine::new(shared.clone(), Arc::new(Metrics::new().unwrap()));
        (fixture, engine, ReviewService::new(shared))
    }

    async fn deliver(engine: &OrderEngine, fixture: &DemoFixture, product_id: Uuid) {
        let order = engine
            .create_order(
                &fixture.consumer,
                PlaceOrder {
                    items: vec![OrderLine { product_id, quantity: 1 }],
                    shipping_address_id: fixture.address.id,
                    payment_method_id: fixture.payment_method.id,
                },
            )
            .await
            .unwrap();

        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            engine
                .update_status(&fixture.seller, ChangeStatus { order_id: order.id, status, note: None })
                .await
                .unwrap();
        }
    }

    fn five_stars() -> NewReview {
        NewReview { rating: 5, comment: Some("Great".to_string()) }
    }

    #[tokio::test]
    async fn test_review_requires_delivered_purchase() {
        let (fixture, engine, reviews) = setup().await;
        let product_id = fixture.products[1].id;

        let before = reviews.create_review(&fixture.consumer, product_id, five_stars()).await;
        assert!(matches!(before, Err(ReviewError::NotEligible(_))));

        deliver(&engine, &fixture, product_id).await;

        let review = reviews
            .create_review(&fixture.consumer, product_id, five_stars())
            .await
            .unwrap();
        assert_eq!(review.rating, 5);

        let listed = reviews.list_product_reviews(product_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, review.id);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (fixture, engine, reviews) = setup().await;
        let product_id = fixture.products[1].id;
        deliver(&engine, &fixture, product_id).await;

        let seller = reviews.create_review(&fixture.seller, product_id, five_stars()).await;
        assert!(matches!(seller, Err(ReviewError::Forbidden)));

        let missing = reviews.create_review(&fixture.consumer, Uuid::now_v7(), five_stars()).await;
        assert!(matches!(missing, Err(ReviewError::ProductNotFound(_))));

        for rating in [0, 6] {
            let result = reviews
                .create_review(&fixture.consumer, product_id, NewReview { rating, comment: None })
                .await;
            assert!(matches!(result, Err(ReviewError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_only_author_may_update_or_delete() {
        let (fixture, engine, reviews) = setup().await;
        let product_id = fixture.products[1].id;
        deliver(&engine, &fixture, product_id).await;
        let review = reviews
            .create_review(&fixture.consumer, product_id, five_stars())
            .await
            .unwrap();

        let update = reviews
            .update_review(&fixture.other_consumer, review.id, ReviewChanges { rating: Some(1), comment: None })
            .await;
        assert!(matches!(update, Err(ReviewError::Forbidden)));

        let delete = reviews.delete_review(&fixture.other_consumer, review.id).await;
        assert!(matches!(delete, Err(ReviewError::Forbidden)));

        let updated = reviews
            .update_review(&fixture.consumer, review.id, ReviewChanges { rating: Some(3), comment: None })
            .await
            .unwrap();
        assert_eq!(updated.rating, 3);
        assert_eq!(updated.comment.as_deref(), Some("Great"));

        let invalid = reviews
            .update_review(&fixture.consumer, review.id, ReviewChanges { rating: Some(9), comment: None })
            .await;
        assert!(matches!(invalid, Err(ReviewError::Validation(_))));

        reviews.delete_review(&fixture.consumer, review.id).await.unwrap();
        assert!(reviews.list_product_reviews(product_id).await.unwrap().is_empty());

        let gone = reviews.delete_review(&fixture.consumer, review.id).await;
        assert!(matches!(gone, Err(ReviewError::ReviewNotFound(_))));
    }
}
