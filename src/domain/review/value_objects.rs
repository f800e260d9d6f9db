use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(user_id: Uuid, product_id: Uuid, rating: i16, comment: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            rating,
            comment: normalize_comment(comment),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_written_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

pub fn is_valid_rating(rating: i16) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Blank comments are stored as absent
pub fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(!is_valid_rating(0));
        assert!(is_valid_rating(1));
        assert!(is_valid_rating(5));
        assert!(!is_valid_rating(6));
    }

    #[test]
    fn test_blank_comment_is_dropped() {
        let review = Review::new(Uuid::now_v7(), Uuid::now_v7(), 4, Some("   ".to_string()), Utc::now());
        assert_eq!(review.comment, None);

        let review = Review::new(Uuid::now_v7(), Uuid::now_v7(), 4, Some(" solid ".to_string()), Utc::now());
        assert_eq!(review.comment.as_deref(), Some("solid"));
    }
}
