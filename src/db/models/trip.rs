//! Trip models and DTOs.
//!
//! One trip row per participant per publication. The lifecycle is strictly
//! linear: pending -> in progress -> completed.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl From<String> for TripStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: String,
    pub publication_id: String,
    pub user_id: String,
    pub status: String,
    pub departure_datetime: Option<String>,
    pub arrival_datetime: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Trip {
    pub fn status_enum(&self) -> TripStatus {
        TripStatus::from(self.status.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub publication_id: String,
}

/// One roster entry in a trip-info response
#[derive(Debug, Clone, Serialize)]
pub struct TripParticipant {
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub is_caller: bool,
}

/// Assembled view of a trip: route, lifecycle state, and who is on board
#[derive(Debug, Serialize)]
pub struct TripInfoResponse {
    pub origin: String,
    pub destination: String,
    pub departure_datetime: Option<String>,
    pub status: String,
    pub driver: TripParticipant,
    pub passengers: Vec<TripParticipant>,
}

/// The caller's trip currently underway, if any
#[derive(Debug, Serialize)]
pub struct InProgressTripResponse {
    pub trip_id: Option<String>,
}

/// A completed trip joined with its publication and participant
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CompletedTripInfo {
    pub trip_id: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub status: String,
    pub first_name: String,
    pub last_name: String,
}
