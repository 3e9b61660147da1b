//! User profile and role-administration endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::{Review, Role, UpdateRoleRequest, User, UserProfileResponse, UserResponse};
use crate::AppState;

use super::auth::require_admin;
use super::error::ApiError;

/// User summary with the reviews written about them and their aggregate
/// rating
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE subject_id = ? ORDER BY review_date DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    let average_rating: (Option<f64>,) =
        sqlx::query_as("SELECT AVG(rating) FROM reviews WHERE subject_id = ?")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(UserProfileResponse {
        user: UserResponse::from(user),
        reviews,
        average_rating: average_rating.0,
    }))
}

/// Change a user's role, admin only. This is how passengers become drivers.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    caller: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&caller)?;

    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::validation_field("role", "Invalid role"))?;

    let now = chrono::Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(&now)
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(user_id = %id, role = %role, "User role updated");

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil;
    use axum::extract::{Path, State};

    #[tokio::test]
    async fn role_changes_are_admin_only() {
        let state = testutil::state().await;
        let admin = testutil::admin(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;

        let err = update_role(
            State(state.clone()),
            passenger.clone(),
            Path(passenger.id.clone()),
            Json(UpdateRoleRequest {
                role: "driver".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let promoted = update_role(
            State(state.clone()),
            admin.clone(),
            Path(passenger.id.clone()),
            Json(UpdateRoleRequest {
                role: "driver".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(promoted.0.role, "driver");

        let err = update_role(
            State(state.clone()),
            admin,
            Path(passenger.id),
            Json(UpdateRoleRequest {
                role: "astronaut".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_includes_reviews_about_the_user() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;
        let (publication, driver_trip) = testutil::publication(&state, &driver, 2).await;
        let passenger_trip =
            testutil::accepted_passenger(&state, &driver, &passenger, &publication.id).await;
        testutil::start(&state, &passenger, &passenger_trip.id).await;
        testutil::complete(&state, &passenger, &passenger_trip.id).await;

        crate::api::reviews::create_review(
            State(state.clone()),
            passenger.clone(),
            Json(crate::db::CreateReviewRequest {
                trip_id: driver_trip.id,
                rating: 5,
                comment: "On time".to_string(),
                subject_id: Some(driver.id.clone()),
                group_index: None,
            }),
        )
        .await
        .unwrap();

        let profile = get_profile(State(state.clone()), passenger, Path(driver.id.clone()))
            .await
            .unwrap();
        assert_eq!(profile.0.user.id, driver.id);
        assert_eq!(profile.0.reviews.len(), 1);
        assert_eq!(profile.0.average_rating, Some(5.0));
    }
}
