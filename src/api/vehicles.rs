//! Vehicle endpoints: owner-scoped CRUD for a driver's cars.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{CreateVehicleRequest, UpdateVehicleRequest, User, Vehicle};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::validate_required;

/// List the caller's vehicles
pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = sqlx::query_as::<_, Vehicle>(
        "SELECT * FROM vehicles WHERE user_id = ? ORDER BY created_at",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(vehicles))
}

/// Register a vehicle for the caller
pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_required(&req.brand, "brand") {
        errors.add("brand", e);
    }
    if let Err(e) = validate_required(&req.model, "model") {
        errors.add("model", e);
    }
    if let Err(e) = validate_required(&req.license_plate, "license_plate") {
        errors.add("license_plate", e);
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO vehicles (id, user_id, brand, model, license_plate, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&req.brand)
    .bind(&req.model)
    .bind(&req.license_plate)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// Get a vehicle by id
pub async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;

    Ok(Json(vehicle))
}

/// Update a vehicle, owner only
pub async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateVehicleRequest>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;

    if vehicle.user_id != user.id {
        return Err(ApiError::forbidden("You are not authorized to update this vehicle"));
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE vehicles SET
            brand = COALESCE(?, brand),
            model = COALESCE(?, model),
            license_plate = COALESCE(?, license_plate),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.brand)
    .bind(&req.model)
    .bind(&req.license_plate)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(vehicle))
}

/// Delete a vehicle, owner only
pub async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;

    if vehicle.user_id != user.id {
        return Err(ApiError::forbidden("You are not authorized to delete this vehicle"));
    }

    sqlx::query("DELETE FROM vehicles WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil;
    use axum::extract::{Path, State};

    #[tokio::test]
    async fn vehicle_crud_is_owner_scoped() {
        let state = testutil::state().await;
        let owner = testutil::driver(&state.db).await;
        let stranger = testutil::driver(&state.db).await;

        let vehicle = create_vehicle(
            State(state.clone()),
            owner.clone(),
            Json(CreateVehicleRequest {
                brand: "Toyota".to_string(),
                model: "Yaris".to_string(),
                license_plate: "AB-CD-12".to_string(),
            }),
        )
        .await
        .unwrap()
        .1
         .0;

        let err = update_vehicle(
            State(state.clone()),
            stranger.clone(),
            Path(vehicle.id.clone()),
            Json(UpdateVehicleRequest {
                brand: None,
                model: Some("Corolla".to_string()),
                license_plate: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let err = delete_vehicle(State(state.clone()), stranger, Path(vehicle.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let mine = list_vehicles(State(state.clone()), owner.clone()).await.unwrap();
        assert_eq!(mine.0.len(), 1);

        let deleted = delete_vehicle(State(state.clone()), owner, Path(vehicle.id))
            .await
            .unwrap();
        assert_eq!(deleted, axum::http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn create_requires_all_fields() {
        let state = testutil::state().await;
        let owner = testutil::driver(&state.db).await;

        let err = create_vehicle(
            State(state.clone()),
            owner,
            Json(CreateVehicleRequest {
                brand: "Toyota".to_string(),
                model: String::new(),
                license_plate: "AB-CD-12".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
