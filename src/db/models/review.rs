//! Review models and DTOs.
//!
//! `author_id` is who wrote the review and owns edits to it; `subject_id` is
//! the participant the rating describes and whose aggregate it feeds.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub trip_id: String,
    pub author_id: String,
    pub subject_id: String,
    pub rating: i64,
    pub comment: String,
    pub review_date: String,
    pub updated_at: String,
}

/// Body for review creation. Exactly one of `subject_id` or `group_index`
/// names the person being reviewed; `group_index` addresses the trip roster
/// (0 = driver, then passengers in roster order).
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub trip_id: String,
    pub rating: i64,
    pub comment: String,
    pub subject_id: Option<String>,
    pub group_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AverageRatingResponse {
    pub average_rating: Option<f64>,
}
