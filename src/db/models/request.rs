//! Ride-request models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl From<String> for RequestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

/// A passenger's bid for a seat on a publication
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RideRequest {
    pub id: String,
    pub publication_id: String,
    pub passenger_id: String,
    pub reservation_date: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RideRequest {
    pub fn status_enum(&self) -> RequestStatus {
        RequestStatus::from(self.status.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub publication_id: String,
    pub reservation_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestStatusRequest {
    pub status: RequestStatus,
}

/// Request joined with its passenger, for the driver's review screen
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RequestWithPassenger {
    pub id: String,
    pub publication_id: String,
    pub passenger_id: String,
    pub reservation_date: Option<String>,
    pub status: String,
    pub created_at: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Driver view of a publication's requests with the live seat count
#[derive(Debug, Serialize)]
pub struct PublicationRequestsResponse {
    pub available_seats: i64,
    pub requests: Vec<RequestWithPassenger>,
}
