//! Publication models and DTOs.
//!
//! A publication is a driver's posted ride offer. `status` is an open/closed
//! flag, not a full state machine: it flips to closed when the last seat is
//! taken or when the driver cancels, and only an explicit update reopens it.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::trip::Trip;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Publication {
    pub id: String,
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    pub available_seats: i64,
    pub cost: i64,
    /// 1 = open for new requests, 0 = closed
    pub status: i64,
    pub departure_date: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Publication {
    pub fn is_open(&self) -> bool {
        self.status != 0
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePublicationRequest {
    pub origin: String,
    pub destination: String,
    pub available_seats: i64,
    pub cost: i64,
    pub departure_date: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePublicationRequest {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub available_seats: Option<i64>,
    pub cost: Option<i64>,
    pub status: Option<bool>,
    pub departure_date: Option<String>,
}

/// Search filter; origin/destination match as case-insensitive substrings,
/// dates are expanded to day granularity.
#[derive(Debug, Default, Deserialize)]
pub struct FilterPublicationsRequest {
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Earliest departure day, YYYY-MM-DD
    pub from_date: Option<String>,
    /// Latest departure day, YYYY-MM-DD
    pub to_date: Option<String>,
}

/// Response for publication creation: the publication plus the driver's own
/// trip spawned alongside it.
#[derive(Debug, Serialize)]
pub struct PublicationWithTrip {
    pub publication: Publication,
    pub trip: Trip,
}
