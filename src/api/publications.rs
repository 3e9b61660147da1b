//! Publication endpoints.
//!
//! A publication opens with a seat count and stays open until the seats run
//! out or the driver closes it. Creation also spawns the driver's own trip so
//! every participant, driver included, has a lifecycle row.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreatePublicationRequest, FilterPublicationsRequest, Publication, PublicationWithTrip,
    UpdatePublicationRequest, User,
};
use crate::AppState;

use super::auth::require_driver;
use super::error::{ApiError, ValidationErrorBuilder};
use super::trips::spawn_trip_for_participant;
use super::validation::{validate_day, validate_required, validate_seats};

fn validate_create_request(req: &CreatePublicationRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_required(&req.origin, "origin") {
        errors.add("origin", e);
    }
    if let Err(e) = validate_required(&req.destination, "destination") {
        errors.add("destination", e);
    }
    if let Err(e) = validate_seats(req.available_seats) {
        errors.add("available_seats", e);
    }
    if req.cost < 0 {
        errors.add("cost", "Cost cannot be negative");
    }
    if let Err(e) = validate_required(&req.departure_date, "departure_date") {
        errors.add("departure_date", e);
    }

    errors.finish()
}

/// List all publications
pub async fn list_publications(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Vec<Publication>>, ApiError> {
    let publications = sqlx::query_as::<_, Publication>(
        "SELECT * FROM publications ORDER BY departure_date",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(publications))
}

/// Get a publication by id
pub async fn get_publication(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Publication>, ApiError> {
    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    Ok(Json(publication))
}

/// List a driver's publications
pub async fn list_publications_by_driver(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(driver_id): Path<String>,
) -> Result<Json<Vec<Publication>>, ApiError> {
    let publications = sqlx::query_as::<_, Publication>(
        "SELECT * FROM publications WHERE driver_id = ? ORDER BY departure_date",
    )
    .bind(&driver_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(publications))
}

/// Search publications by route substrings and a departure-day window
pub async fn filter_publications(
    State(state): State<Arc<AppState>>,
    _user: User,
    Json(filter): Json<FilterPublicationsRequest>,
) -> Result<Json<Vec<Publication>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref day) = filter.from_date {
        if let Err(e) = validate_day(day, "from_date") {
            errors.add("from_date", e);
        }
    }
    if let Some(ref day) = filter.to_date {
        if let Err(e) = validate_day(day, "to_date") {
            errors.add("to_date", e);
        }
    }
    errors.finish()?;

    // Day granularity: the window spans the whole first and last days
    let from = filter.from_date.as_ref().map(|d| format!("{}T00:00:00", d));
    let to = filter.to_date.as_ref().map(|d| format!("{}T23:59:59", d));

    let publications = sqlx::query_as::<_, Publication>(
        r#"
        SELECT * FROM publications
        WHERE (?1 IS NULL OR instr(lower(origin), lower(?1)) > 0)
          AND (?2 IS NULL OR instr(lower(destination), lower(?2)) > 0)
          AND (?3 IS NULL OR departure_date >= ?3)
          AND (?4 IS NULL OR departure_date <= ?4)
        ORDER BY departure_date
        "#,
    )
    .bind(&filter.origin)
    .bind(&filter.destination)
    .bind(&from)
    .bind(&to)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(publications))
}

/// Create a publication and the driver's own pending trip
pub async fn create_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreatePublicationRequest>,
) -> Result<(StatusCode, Json<PublicationWithTrip>), ApiError> {
    require_driver(&user)?;
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO publications (id, driver_id, origin, destination, available_seats, cost, status, departure_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&req.origin)
    .bind(&req.destination)
    .bind(req.available_seats)
    .bind(req.cost)
    .bind(&req.departure_date)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let trip = spawn_trip_for_participant(&mut tx, &id, &user.id).await?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    tracing::info!(publication_id = %id, driver_id = %user.id, "Publication created");

    Ok((StatusCode::CREATED, Json(PublicationWithTrip { publication, trip })))
}

/// Update a publication, owner only
pub async fn update_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdatePublicationRequest>,
) -> Result<Json<Publication>, ApiError> {
    require_driver(&user)?;

    if let Some(seats) = req.available_seats {
        if let Err(e) = validate_seats(seats) {
            return Err(ApiError::validation_field("available_seats", e));
        }
    }

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to update this publication",
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        UPDATE publications SET
            origin = COALESCE(?, origin),
            destination = COALESCE(?, destination),
            available_seats = COALESCE(?, available_seats),
            cost = COALESCE(?, cost),
            status = COALESCE(?, status),
            departure_date = COALESCE(?, departure_date),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.origin)
    .bind(&req.destination)
    .bind(req.available_seats)
    .bind(req.cost)
    .bind(req.status.map(|s| s as i64))
    .bind(&req.departure_date)
    .bind(&now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    // A publication with no seats left never stays open
    sqlx::query("UPDATE publications SET status = 0 WHERE id = ? AND available_seats = 0")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(Json(publication))
}

/// Delete a publication, owner only
pub async fn delete_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_driver(&user)?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to delete this publication",
        ));
    }

    let result = sqlx::query("DELETE FROM publications WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Publication not found"));
    }

    tracing::info!(publication_id = %id, "Publication deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a publication: close it and reject every request on it, as one
/// committed unit. Trips already spawned from accepted requests are left
/// alone; the ride may still happen for those on board.
pub async fn cancel_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Publication>, ApiError> {
    require_driver(&user)?;

    let mut tx = state.db.begin().await?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to cancel this publication",
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query("UPDATE publications SET status = 0, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE requests SET status = 'rejected', updated_at = ? WHERE publication_id = ?")
        .bind(&now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    tracing::info!(publication_id = %id, "Publication cancelled");

    Ok(Json(publication))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil;
    use axum::extract::{Path, State};

    #[tokio::test]
    async fn create_spawns_driver_trip() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;

        let (publication, trip) = testutil::publication(&state, &driver, 3).await;
        assert_eq!(publication.driver_id, driver.id);
        assert_eq!(publication.available_seats, 3);
        assert!(publication.is_open());
        assert_eq!(trip.publication_id, publication.id);
        assert_eq!(trip.user_id, driver.id);
        assert_eq!(trip.status, "pending");
    }

    #[tokio::test]
    async fn passengers_cannot_publish() {
        let state = testutil::state().await;
        let passenger = testutil::passenger(&state.db).await;

        let err = create_publication(
            State(state.clone()),
            passenger,
            Json(CreatePublicationRequest {
                origin: "Santiago".to_string(),
                destination: "Valparaiso".to_string(),
                available_seats: 3,
                cost: 5000,
                departure_date: "2025-06-01T09:00:00Z".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn only_owner_updates_or_deletes() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let other_driver = testutil::driver(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 3).await;

        let patch = UpdatePublicationRequest {
            origin: None,
            destination: None,
            available_seats: None,
            cost: Some(9000),
            status: None,
            departure_date: None,
        };
        let err = update_publication(
            State(state.clone()),
            other_driver.clone(),
            Path(publication.id.clone()),
            Json(patch),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let err = delete_publication(
            State(state.clone()),
            other_driver,
            Path(publication.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        // Unchanged by either attempt
        let unchanged = testutil::fetch_publication(&state.db, &publication.id).await;
        assert_eq!(unchanged.cost, publication.cost);

        // The owner can delete, driver trip included
        let deleted = delete_publication(State(state.clone()), driver, Path(publication.id.clone()))
            .await
            .unwrap();
        assert_eq!(deleted, axum::http::StatusCode::NO_CONTENT);

        let trips: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trips WHERE publication_id = ?")
            .bind(&publication.id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(trips.0, 0);
    }

    #[tokio::test]
    async fn update_patches_and_autocloses_at_zero_seats() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 3).await;

        let updated = update_publication(
            State(state.clone()),
            driver.clone(),
            Path(publication.id.clone()),
            Json(UpdatePublicationRequest {
                origin: Some("Rancagua".to_string()),
                destination: None,
                available_seats: Some(0),
                cost: None,
                status: None,
                departure_date: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.0.origin, "Rancagua");
        assert_eq!(updated.0.destination, publication.destination);
        assert_eq!(updated.0.available_seats, 0);
        assert!(!updated.0.is_open());

        // Reopening is an explicit driver action
        let reopened = update_publication(
            State(state.clone()),
            driver,
            Path(publication.id),
            Json(UpdatePublicationRequest {
                origin: None,
                destination: None,
                available_seats: Some(2),
                cost: None,
                status: Some(true),
                departure_date: None,
            }),
        )
        .await
        .unwrap();
        assert!(reopened.0.is_open());
        assert_eq!(reopened.0.available_seats, 2);
    }

    #[tokio::test]
    async fn cancel_rejects_all_requests_atomically() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger_a = testutil::passenger(&state.db).await;
        let passenger_b = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 3).await;

        let accepted = testutil::request(&state, &passenger_a, &publication.id).await;
        testutil::accept(&state, &driver, &accepted.id).await;
        testutil::request(&state, &passenger_b, &publication.id).await;

        let cancelled = cancel_publication(
            State(state.clone()),
            driver.clone(),
            Path(publication.id.clone()),
        )
        .await
        .unwrap();
        assert!(!cancelled.0.is_open());

        // Every request is rejected, accepted ones included
        let statuses: Vec<(String,)> =
            sqlx::query_as("SELECT status FROM requests WHERE publication_id = ?")
                .bind(&publication.id)
                .fetch_all(&state.db)
                .await
                .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|(s,)| s == "rejected"));

        // The accepted passenger's spawned trip is deliberately untouched
        let trip: (String,) = sqlx::query_as(
            "SELECT status FROM trips WHERE publication_id = ? AND user_id = ?",
        )
        .bind(&publication.id)
        .bind(&passenger_a.id)
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(trip.0, "pending");
    }

    #[tokio::test]
    async fn filter_matches_route_substrings_and_day_window() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;

        testutil::publication_on(&state, &driver, "Santiago", "Valparaiso", "2025-06-01T09:00:00Z")
            .await;
        testutil::publication_on(&state, &driver, "Santiago", "Concepcion", "2025-06-03T09:00:00Z")
            .await;
        testutil::publication_on(&state, &driver, "La Serena", "Valparaiso", "2025-06-10T09:00:00Z")
            .await;

        let found = filter_publications(
            State(state.clone()),
            driver.clone(),
            Json(FilterPublicationsRequest {
                origin: Some("santi".to_string()),
                destination: None,
                from_date: None,
                to_date: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.0.len(), 2);

        let found = filter_publications(
            State(state.clone()),
            driver.clone(),
            Json(FilterPublicationsRequest {
                origin: None,
                destination: Some("VALPO".to_string()),
                from_date: None,
                to_date: None,
            }),
        )
        .await
        .unwrap();
        assert!(found.0.is_empty());

        let found = filter_publications(
            State(state.clone()),
            driver.clone(),
            Json(FilterPublicationsRequest {
                origin: None,
                destination: Some("valpara".to_string()),
                from_date: Some("2025-06-01".to_string()),
                to_date: Some("2025-06-01".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.0.len(), 1);
        assert_eq!(found.0[0].origin, "Santiago");

        let err = filter_publications(
            State(state.clone()),
            driver,
            Json(FilterPublicationsRequest {
                origin: None,
                destination: None,
                from_date: Some("01-06-2025".to_string()),
                to_date: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
