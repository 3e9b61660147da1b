pub mod auth;
mod error;
mod publications;
mod requests;
mod reviews;
mod trips;
mod users;
mod validation;
mod vehicles;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public except /validate, which authenticates itself)
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/validate", get(auth::validate));

    // Every handler below authenticates through the User extractor
    let api_routes = Router::new()
        // Publications
        .route("/publications", get(publications::list_publications))
        .route("/publications/filtered", post(publications::filter_publications))
        .route("/publications/:id", get(publications::get_publication))
        .route("/createPublication", post(publications::create_publication))
        .route("/updatePublication/:id", patch(publications::update_publication))
        .route("/deletePublication/:id", delete(publications::delete_publication))
        .route("/cancelPublication/:id", patch(publications::cancel_publication))
        // Requests
        .route("/requests", post(requests::create_request))
        .route("/requests/driver", get(requests::list_requests_for_driver))
        .route("/requests/passenger", get(requests::list_requests_for_passenger))
        .route(
            "/requests/publication/:publicationId",
            get(requests::list_requests_for_publication),
        )
        .route("/requests/status/:id", put(requests::update_request_status))
        .route("/requests/:id", get(requests::get_request))
        // Trips
        .route("/trips", post(trips::create_trip))
        .route("/trips/driver", get(trips::list_trips_for_driver))
        .route("/trips/passenger", get(trips::list_trips_for_passenger))
        .route("/trips/inprogress", get(trips::get_in_progress_trip))
        .route("/trips/completed", get(trips::get_completed_trips))
        .route("/trips/start/:id", put(trips::start_trip))
        .route("/trips/complete/:id", put(trips::complete_trip))
        .route(
            "/trips/publication/:publicationId",
            get(trips::list_trips_for_publication),
        )
        .route("/trips/:id", get(trips::get_trip))
        .route("/trips/:id/info", get(trips::get_trip_info))
        .route("/trips/:id/group/:groupIndex", get(trips::get_group_profile))
        // Reviews
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/user/:userId", get(reviews::list_reviews_by_user))
        .route("/reviews/trip/:tripId", get(reviews::list_reviews_by_trip))
        .route("/reviews/:id", get(reviews::get_review))
        .route("/reviews/:id", put(reviews::update_review))
        .route("/reviews/:id", delete(reviews::delete_review))
        // Users
        .route("/users/:id/profile", get(users::get_profile))
        .route("/users/:id/rating", get(reviews::get_average_rating))
        .route("/users/:id/role", put(users::update_role))
        .route("/users/:id/publications", get(publications::list_publications_by_driver))
        // Vehicles
        .route("/vehicles", get(vehicles::list_vehicles))
        .route("/vehicles", post(vehicles::create_vehicle))
        .route("/vehicles/:id", get(vehicles::get_vehicle))
        .route("/vehicles/:id", put(vehicles::update_vehicle))
        .route("/vehicles/:id", delete(vehicles::delete_vehicle));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
