//! Ride-request endpoints.
//!
//! Requests move pending -> accepted | rejected, driven only by the owning
//! publication's driver. Acceptance is the critical section: the seat
//! decrement, the auto-close at zero, the status write, and the passenger
//! trip spawn commit as one transaction, with the decrement guarded by
//! `available_seats > 0` so concurrent accepts cannot oversell.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateRideRequest, Publication, PublicationRequestsResponse, RequestStatus,
    RequestWithPassenger, RideRequest, UpdateRequestStatusRequest, User,
};
use crate::AppState;

use super::error::ApiError;
use super::trips::spawn_trip_for_participant;

/// Create a request for a seat on a publication
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<RideRequest>), ApiError> {
    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&req.publication_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if !publication.is_open() {
        return Err(ApiError::bad_request("Publication is closed"));
    }

    if publication.available_seats <= 0 {
        return Err(ApiError::bad_request("No available seats"));
    }

    // One request per passenger per publication, in any state. A rejection
    // is final; it does not free the passenger to request again.
    let existing = sqlx::query_as::<_, RideRequest>(
        "SELECT * FROM requests WHERE publication_id = ? AND passenger_id = ?",
    )
    .bind(&req.publication_id)
    .bind(&user.id)
    .fetch_optional(&state.db)
    .await?;

    if existing.is_some() {
        return Err(ApiError::conflict("Already requested"));
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO requests (id, publication_id, passenger_id, reservation_date, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.publication_id)
    .bind(&user.id)
    .bind(&req.reservation_date)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let request = sqlx::query_as::<_, RideRequest>("SELECT * FROM requests WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// Get a request by id
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<RideRequest>, ApiError> {
    let request = sqlx::query_as::<_, RideRequest>("SELECT * FROM requests WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Request not found"))?;

    Ok(Json(request))
}

/// Requests on a publication with passenger summaries and the live seat
/// count, for the publication's driver
pub async fn list_requests_for_publication(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(publication_id): Path<String>,
) -> Result<Json<PublicationRequestsResponse>, ApiError> {
    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&publication_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Publication not found"))?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to view requests of this publication",
        ));
    }

    let requests = sqlx::query_as::<_, RequestWithPassenger>(
        r#"
        SELECT r.id, r.publication_id, r.passenger_id, r.reservation_date,
               r.status, r.created_at, u.first_name, u.last_name, u.phone
        FROM requests r
        JOIN users u ON u.id = r.passenger_id
        WHERE r.publication_id = ?
        ORDER BY r.created_at
        "#,
    )
    .bind(&publication_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PublicationRequestsResponse {
        available_seats: publication.available_seats,
        requests,
    }))
}

/// The caller's own requests
pub async fn list_requests_for_passenger(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<RideRequest>>, ApiError> {
    let requests = sqlx::query_as::<_, RideRequest>(
        "SELECT * FROM requests WHERE passenger_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

/// Requests across all of the caller's publications
pub async fn list_requests_for_driver(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<RideRequest>>, ApiError> {
    super::auth::require_driver(&user)?;

    let requests = sqlx::query_as::<_, RideRequest>(
        r#"
        SELECT r.* FROM requests r
        JOIN publications p ON p.id = r.publication_id
        WHERE p.driver_id = ?
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

/// Accept or reject a request, as the publication's driver.
///
/// Accepting takes a seat and spawns the passenger's trip; rejecting only
/// flips the status. Both outcomes are terminal.
pub async fn update_request_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequestStatusRequest>,
) -> Result<Json<RideRequest>, ApiError> {
    let mut tx = state.db.begin().await?;

    let request = sqlx::query_as::<_, RideRequest>("SELECT * FROM requests WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Request not found"))?;

    let publication =
        sqlx::query_as::<_, Publication>("SELECT * FROM publications WHERE id = ?")
            .bind(&request.publication_id)
            .fetch_one(&mut *tx)
            .await?;

    if publication.driver_id != user.id {
        return Err(ApiError::forbidden(
            "You are not authorized to update the status of this request",
        ));
    }

    if request.status_enum() != RequestStatus::Pending {
        return Err(ApiError::bad_request("Request has already been resolved"));
    }

    let now = chrono::Utc::now().to_rfc3339();

    match req.status {
        RequestStatus::Accepted => {
            // Conditional decrement: fails when the last seat is already
            // gone, closes the publication when this one was the last.
            let taken = sqlx::query(
                r#"
                UPDATE publications
                SET available_seats = available_seats - 1,
                    status = CASE WHEN available_seats <= 1 THEN 0 ELSE status END,
                    updated_at = ?
                WHERE id = ? AND available_seats > 0
                "#,
            )
            .bind(&now)
            .bind(&publication.id)
            .execute(&mut *tx)
            .await?;

            if taken.rows_affected() == 0 {
                return Err(ApiError::bad_request("No available seats"));
            }

            sqlx::query("UPDATE requests SET status = 'accepted', updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;

            spawn_trip_for_participant(&mut tx, &request.publication_id, &request.passenger_id)
                .await?;
        }
        RequestStatus::Rejected => {
            sqlx::query("UPDATE requests SET status = 'rejected', updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        RequestStatus::Pending => {
            return Err(ApiError::bad_request("Request status must be accepted or rejected"));
        }
    }

    let request = sqlx::query_as::<_, RideRequest>("SELECT * FROM requests WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(request_id = %id, status = %request.status, "Request resolved");

    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil;
    use axum::extract::{Path, State};

    async fn make_request(
        state: &Arc<AppState>,
        passenger: &User,
        publication_id: &str,
    ) -> RideRequest {
        create_request(
            State(state.clone()),
            passenger.clone(),
            Json(CreateRideRequest {
                publication_id: publication_id.to_string(),
                reservation_date: None,
            }),
        )
        .await
        .unwrap()
        .1
         .0
    }

    #[tokio::test]
    async fn accept_decrements_seats_and_spawns_trip() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 2).await;

        let request = make_request(&state, &passenger, &publication.id).await;
        assert_eq!(request.status, "pending");

        let accepted = update_request_status(
            State(state.clone()),
            driver.clone(),
            Path(request.id.clone()),
            Json(UpdateRequestStatusRequest {
                status: RequestStatus::Accepted,
            }),
        )
        .await
        .unwrap();
        assert_eq!(accepted.0.status, "accepted");

        let publication = testutil::fetch_publication(&state.db, &publication.id).await;
        assert_eq!(publication.available_seats, 1);
        assert!(publication.is_open());

        let trip: Option<crate::db::Trip> = sqlx::query_as(
            "SELECT * FROM trips WHERE publication_id = ? AND user_id = ?",
        )
        .bind(&publication.id)
        .bind(&passenger.id)
        .fetch_optional(&state.db)
        .await
        .unwrap();
        assert_eq!(trip.unwrap().status, "pending");
    }

    #[tokio::test]
    async fn last_seat_closes_publication() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;
        let late_passenger = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 1).await;

        let request = make_request(&state, &passenger, &publication.id).await;
        update_request_status(
            State(state.clone()),
            driver.clone(),
            Path(request.id),
            Json(UpdateRequestStatusRequest {
                status: RequestStatus::Accepted,
            }),
        )
        .await
        .unwrap();

        let publication_after = testutil::fetch_publication(&state.db, &publication.id).await;
        assert_eq!(publication_after.available_seats, 0);
        assert!(!publication_after.is_open());

        // Nobody else can request the exhausted publication
        let err = create_request(
            State(state.clone()),
            late_passenger,
            Json(CreateRideRequest {
                publication_id: publication.id.clone(),
                reservation_date: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Publication is closed");
    }

    #[tokio::test]
    async fn concurrent_accepts_cannot_oversell() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger_a = testutil::passenger(&state.db).await;
        let passenger_b = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 1).await;

        let request_a = make_request(&state, &passenger_a, &publication.id).await;
        let request_b = make_request(&state, &passenger_b, &publication.id).await;

        let accept = |id: String| {
            let state = state.clone();
            let driver = driver.clone();
            async move {
                update_request_status(
                    State(state),
                    driver,
                    Path(id),
                    Json(UpdateRequestStatusRequest {
                        status: RequestStatus::Accepted,
                    }),
                )
                .await
            }
        };

        let (a, b) = tokio::join!(accept(request_a.id), accept(request_b.id));
        assert!(a.is_ok() != b.is_ok(), "exactly one accept must win");

        let publication = testutil::fetch_publication(&state.db, &publication.id).await;
        assert_eq!(publication.available_seats, 0);
        assert!(!publication.is_open());
    }

    #[tokio::test]
    async fn duplicate_request_is_rejected() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 3).await;

        let first = make_request(&state, &passenger, &publication.id).await;

        let err = create_request(
            State(state.clone()),
            passenger.clone(),
            Json(CreateRideRequest {
                publication_id: publication.id.clone(),
                reservation_date: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        // A rejection is terminal and still blocks a fresh request
        update_request_status(
            State(state.clone()),
            driver.clone(),
            Path(first.id.clone()),
            Json(UpdateRequestStatusRequest {
                status: RequestStatus::Rejected,
            }),
        )
        .await
        .unwrap();

        let err = create_request(
            State(state.clone()),
            passenger.clone(),
            Json(CreateRideRequest {
                publication_id: publication.id.clone(),
                reservation_date: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        // And a resolved request cannot be flipped again
        let err = update_request_status(
            State(state.clone()),
            driver,
            Path(first.id),
            Json(UpdateRequestStatusRequest {
                status: RequestStatus::Accepted,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_publication_driver_resolves_requests() {
        let state = testutil::state().await;
        let driver = testutil::driver(&state.db).await;
        let other_driver = testutil::driver(&state.db).await;
        let passenger = testutil::passenger(&state.db).await;
        let (publication, _) = testutil::publication(&state, &driver, 2).await;

        let request = make_request(&state, &passenger, &publication.id).await;

        let err = update_request_status(
            State(state.clone()),
            other_driver,
            Path(request.id.clone()),
            Json(UpdateRequestStatusRequest {
                status: RequestStatus::Accepted,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

        let untouched = get_request(State(state.clone()), driver, Path(request.id))
            .await
            .unwrap();
        assert_eq!(untouched.0.status, "pending");
    }
}
