//! Trip lifecycle endpoints.
//!
//! A trip tracks one participant's passage through a publication:
//! pending -> in progress -> completed. Trips are normally spawned as a side
//! effect of publication creation (driver) and request acceptance (passenger);
//! both call sites go through [`spawn_trip_for_participant`] so the rules live
//! in one place. Whether a user "is on a trip" is always derived from the
//! trips table, never kept as a flag on the user row.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{
    CompletedTripInfo, CreateTripRequest, InProgressTripResponse, Publication, Review, RideRequest,
    Trip, TripInfoResponse, TripParticipant, TripStatus, User, UserProfileResponse, UserResponse,
};
use crate::AppState;

use super::error::ApiError;

/// Failures while resolving a trip's participant roster
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Trip not found")]
    TripNotFound,
    #[error("Invalid group index")]
    InvalidIndex,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<RosterError> for ApiError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::TripNotFound => ApiError::not_found("Trip not found"),
            RosterError::InvalidIndex => ApiError::bad_request("Invalid group index"),
            RosterError::Database(e) => e.into(),
        }
    }
}

/// Insert a pending trip for one participant of a publication.
///
/// Invoked from publication creation (the driver's own trip), request
/// acceptance (the passenger's trip), and the direct-create endpoint. Runs on
/// a connection so callers can place it inside their own transaction.
pub(crate) async fn spawn_trip_for_participant(
    conn: &mut SqliteConnection,
    publication_id: &str,
    user_id: &str,
) -> Result<Trip, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO trips (id, publication_id, user_id, status, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(publication_id)
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await
}

/// Passenger trips that count as "on board": started or finished, in stable
/// retrieval order.
async fn roster_passenger_trips(
    pool: &sqlx::SqlitePool,
    publication_id: &str,
    driver_id: &str,
) -> Result<Vec<Trip>, sqlx::Error> {
    sqlx::query_as::<_, Trip>(
        r#"
        SELECT * FROM trips
        WHERE publication_id = ? AND user_id != ?
          AND status IN ('in progress', 'completed')
        ORDER BY created_at, id
        "#,
    )
    .bind(publication_id)
    .bind(driver_id)
    .fetch_all(pool)
    .await
}

/// Resolve the user at `group_index` in a trip's ordered roster:
/// index 0 is the driver, then the on-board passengers in retrieval order.
/// Lets clients address "the 2nd person on this trip" without raw user ids.
pub(crate) async fn resolve_participant_by_group_index(
    pool: &sqlx::SqlitePool,
    trip_id: &str,
    group_index: i64,
) -> Result<String, RosterError> {
    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(trip_id)
        .fetch_optional(pool)
        .await?
        .ok_or(RosterError::TripNotFound)?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&trip.publication_id)
            .fetch_one(pool)
            .await?;

    let passengers =
        roster_passenger_trips(pool, &trip.publication_id, &publication.driver_id).await?;

    let mut roster = vec![publication.driver_id];
    roster.extend(passengers.into_iter().map(|t| t.user_id));

    if group_index < 0 || group_index as usize >= roster.len() {
        return Err(RosterError::InvalidIndex);
    }

    Ok(roster.swap_remove(group_index as usize))
}

/// Create a trip directly. The implicit spawn paths cover the normal flows;
/// this guarded endpoint exists for clients that re-create a missing trip row.
pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<Trip>), ApiError> {
    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&req.publication_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    let existing = sqlx::query_as::<_, Trip>(
        "SELECT * FROM trips WHERE publication_id = ? AND user_id = ?",
    )
    .bind(&req.publication_id)
    .bind(&user.id)
    .fetch_optional(&state.db)
    .await?;

    if existing.is_some() {
        return Err(ApiError::conflict("You can only have one trip per publication"));
    }

    // The driver may always hold a trip on their own publication; anyone else
    // needs an accepted request.
    if publication.driver_id != user.id {
        let accepted = sqlx::query_as::<_, RideRequest>(
            "SELECT * FROM requests WHERE publication_id = ? AND passenger_id = ? AND status = 'accepted'",
        )
        .bind(&req.publication_id)
        .bind(&user.id)
        .fetch_optional(&state.db)
        .await?;

        if accepted.is_none() {
            return Err(ApiError::forbidden("You are not accepted on this trip"));
        }
    }

    let mut tx = state.db.begin().await?;
    let trip = spawn_trip_for_participant(&mut tx, &req.publication_id, &user.id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(trip)))
}

/// Get a trip by id
pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    Ok(Json(trip))
}

/// Start a trip: pending -> in progress, stamping the departure time.
/// A user can have at most one trip underway across the whole system; the
/// check runs in the same transaction as the status write.
pub async fn start_trip(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let mut tx = state.db.begin().await?;

    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    if trip.user_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to update the status of this trip",
        ));
    }

    let in_progress: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trips WHERE user_id = ? AND status = 'in progress'",
    )
    .bind(&user.id)
    .fetch_one(&mut *tx)
    .await?;

    if in_progress.0 > 0 {
        return Err(ApiError::forbidden("Cannot make two trips at the same time"));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let updated = sqlx::query(
        r#"
        UPDATE trips SET status = 'in progress', departure_datetime = ?, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::bad_request("Trip has already been started"));
    }

    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(trip_id = %id, user_id = %user.id, "Trip started");

    Ok(Json(trip))
}

/// Complete a trip: in progress -> completed, stamping the arrival time.
/// The trip's own participant completes their own row; the publication's
/// driver instead completes every trip underway on the publication at once.
pub async fn complete_trip(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let mut tx = state.db.begin().await?;

    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&trip.publication_id)
            .fetch_one(&mut *tx)
            .await?;

    let now = chrono::Utc::now().to_rfc3339();

    if publication.driver_id == user.id {
        // Group completion: everyone still underway on this publication
        // arrives together, in one committed unit.
        let updated = sqlx::query(
            r#"
            UPDATE trips SET status = 'completed', arrival_datetime = ?, updated_at = ?
            WHERE publication_id = ? AND status = 'in progress'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&trip.publication_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ApiError::bad_request(
                "You cannot complete a trip that has not been started",
            ));
        }
    } else {
        if trip.user_id != user.id {
            return Err(ApiError::forbidden(
                "You are not authorized to update the status of this trip",
            ));
        }

        if trip.status_enum() != TripStatus::InProgress {
            return Err(ApiError::bad_request(
                "You cannot complete a trip that has not been started",
            ));
        }

        sqlx::query(
            r#"
            UPDATE trips SET status = 'completed', arrival_datetime = ?, updated_at = ?
            WHERE id = ? AND status = 'in progress'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    }

    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(trip_id = %id, user_id = %user.id, "Trip completed");

    Ok(Json(trip))
}

/// Assembled trip view: route, state, driver, and who is on board.
/// Only visible to the driver and the on-board participants.
pub async fn get_trip_info(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<TripInfoResponse>, ApiError> {
    let trip = sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&trip.publication_id)
            .fetch_one(&state.db)
            .await?;

    let driver = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&publication.driver_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Driver not found"))?;

    let passenger_trips =
        roster_passenger_trips(&state.db, &trip.publication_id, &publication.driver_id).await?;

    let mut passengers = Vec::with_capacity(passenger_trips.len());
    for pt in &passenger_trips {
        let passenger = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&pt.user_id)
            .fetch_one(&state.db)
            .await?;
        passengers.push(TripParticipant {
            first_name: passenger.first_name,
            last_name: passenger.last_name,
            status: pt.status.clone(),
            is_caller: pt.user_id == user.id,
        });
    }

    let is_driver = publication.driver_id == user.id;
    if !is_driver && !passenger_trips.iter().any(|t| t.user_id == user.id) {
        return Err(ApiError::forbidden("You are not part of this trip"));
    }

    let driver_trip_status: Option<(String,)> = sqlx::query_as(
        "SELECT status FROM trips WHERE publication_id = ? AND user_id = ?",
    )
    .bind(&trip.publication_id)
    .bind(&publication.driver_id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(TripInfoResponse {
        origin: publication.origin,
        destination: publication.destination,
        departure_datetime: trip.departure_datetime,
        status: trip.status,
        driver: TripParticipant {
            first_name: driver.first_name,
            last_name: driver.last_name,
            status: driver_trip_status.map(|(s,)| s).unwrap_or_else(|| TripStatus::Pending.to_string()),
            is_caller: is_driver,
        },
        passengers,
    }))
}

/// The caller's trip currently underway, if any
pub async fn get_in_progress_trip(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<InProgressTripResponse>, ApiError> {
    let trip = sqlx::query_as::<_, Trip>(
        "SELECT * FROM trips WHERE user_id = ? AND status = 'in progress'",
    )
    .bind(&user.id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(InProgressTripResponse {
        trip_id: trip.map(|t| t.id),
    }))
}

/// The caller's completed trips, joined with route and participant name
pub async fn get_completed_trips(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<CompletedTripInfo>>, ApiError> {
    let trips = sqlx::query_as::<_, CompletedTripInfo>(
        r#"
        SELECT t.id AS trip_id, p.origin, p.destination, p.departure_date,
               t.status, u.first_name, u.last_name
        FROM trips t
        JOIN publications p ON p.id = t.publication_id
        JOIN users u ON u.id = t.user_id
        WHERE t.user_id = ? AND t.status = 'completed'
        ORDER BY t.arrival_datetime DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(trips))
}

/// The caller's own trips on publications they drive
pub async fn list_trips_for_driver(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Trip>>, ApiError> {
    super::auth::require_driver(&user)?;

    let trips = sqlx::query_as::<_, Trip>(
        r#"
        SELECT t.* FROM trips t
        JOIN publications p ON p.id = t.publication_id
        WHERE p.driver_id = ? AND t.user_id = ?
        ORDER BY t.created_at DESC
        "#,
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(trips))
}

/// The caller's trips as a passenger (publications driven by someone else)
pub async fn list_trips_for_passenger(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Trip>>, ApiError> {
    let trips = sqlx::query_as::<_, Trip>(
        r#"
        SELECT t.* FROM trips t
        JOIN publications p ON p.id = t.publication_id
        WHERE t.user_id = ? AND p.driver_id != ?
        ORDER BY t.created_at DESC
        "#,
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(trips))
}

/// All trips of a publication, for its driver only
pub async fn list_trips_for_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(publication_id): Path<String>,
) -> Result<Json<Vec<Trip>>, ApiError> {
    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&publication_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to view trips of this publication",
        ));
    }

    let trips =
        sqlx::query_as::<_, Trip>("SELECT * FROM trips WHERE publication_id = ? ORDER BY created_at")
            .bind(&publication_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(trips))
}

/// Profile of the participant at a roster position: user summary plus the
/// reviews written about them
pub async fn get_group_profile(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path((trip_id, group_index)): Path<(String, i64)>,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let user_id = resolve_participant_by_group_index(&state.db, &trip_id, group_index).await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE subject_id = ? ORDER BY review_date DESC",
    )
    .bind(&user_id)
    .fetch_all(&state.db)
    .await?;

    let average_rating: (Option<f64>,) =
        sqlx::query_as("SELECT AVG(rating) FROM reviews WHERE subject_id = ?")
            .bind(&user_id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(UserProfileResponse {
        user: UserResponse::from(user),
        reviews,
        average_rating: average_rating.0,
    }))
}
