//! Review endpoints.
//!
//! Reviews are written by one participant of a trip about another. The
//! subject is named directly or addressed by roster position; the author is
//! always the caller and is the only one who may edit or delete the review.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    AverageRatingResponse, CreateReviewRequest, Publication, Review, Trip, UpdateReviewRequest,
    User,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::trips::resolve_participant_by_group_index;
use super::validation::{validate_rating, validate_required, validate_uuid};

fn validate_create_request(req: &CreateReviewRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_uuid(&req.trip_id, "trip_id") {
        errors.add("trip_id", e);
    }
    if let Err(e) = validate_rating(req.rating) {
        errors.add("rating", e);
    }
    if let Err(e) = validate_required(&req.comment, "comment") {
        errors.add("comment", e);
    }
    if req.subject_id.is_none() && req.group_index.is_none() {
        errors.add("subject_id", "Either subject_id or group_index is required");
    }

    errors.finish()
}

/// Is `user_id` the driver of the trip's publication or a participant who
/// actually got on board?
async fn is_trip_participant(
    pool: &sqlx::SqlitePool,
    publication: &Publication,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    if publication.driver_id == user_id {
        return Ok(true);
    }

    let on_board: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM trips
        WHERE publication_id = ? AND user_id = ?
          AND status IN ('in progress', 'completed')
        "#,
    )
    .bind(&publication.id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(on_board.0 > 0)
}

/// Create a review about a trip participant
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    validate_create_request(&req)?;

    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&req.trip_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&trip.publication_id)
            .fetch_one(&state.db)
            .await?;

    if !is_trip_participant(&state.db, &publication, &user.id).await? {
        return Err(ApiError::forbidden("You are not part of this trip"));
    }

    let subject_id = match (&req.subject_id, req.group_index) {
        (Some(subject_id), _) => {
            if !is_trip_participant(&state.db, &publication, subject_id).await? {
                return Err(ApiError::bad_request("Subject is not part of this trip"));
            }
            subject_id.clone()
        }
        (None, Some(index)) => {
            resolve_participant_by_group_index(&state.db, &req.trip_id, index).await?
        }
        (None, None) => unreachable!("validated above"),
    };

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO reviews (id, trip_id, author_id, subject_id, rating, comment, review_date, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.trip_id)
    .bind(&user.id)
    .bind(&subject_id)
    .bind(req.rating)
    .bind(&req.comment)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

/// Get a review by id
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Review>, ApiError> {
    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    Ok(Json(review))
}

/// Reviews written about a user
pub async fn list_reviews_by_user(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE subject_id = ? ORDER BY review_date DESC",
    )
    .bind(&user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(reviews))
}

/// Reviews attached to a trip
pub async fn list_reviews_by_trip(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(trip_id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE trip_id = ? ORDER BY review_date DESC",
    )
    .bind(&trip_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(reviews))
}

/// Update a review, author only
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    if let Some(rating) = req.rating {
        if let Err(e) = validate_rating(rating) {
            return Err(ApiError::validation_field("rating", e));
        }
    }

    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    if review.author_id != user.id {
        return Err(ApiError::forbidden("You are not authorized to update this review"));
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE reviews SET
            rating = COALESCE(?, rating),
            comment = COALESCE(?, comment),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.rating)
    .bind(&req.comment)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(review))
}

/// Delete a review, author only
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    if review.author_id != user.id {
        return Err(ApiError::forbidden("You are not authorized to delete this review"));
    }

    sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Average rating received by a user, `null` when unreviewed
pub async fn get_average_rating(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(user_id): Path<String>,
) -> Result<Json<AverageRatingResponse>, ApiError> {
    let average: (Option<f64>,) =
        sqlx::query_as("SELECT AVG(rating) FROM reviews WHERE subject_id = ?")
            .bind(&user_id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(AverageRatingResponse {
        average_rating: average.0,
    }))
}
