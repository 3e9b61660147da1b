//! Vehicle models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: String,
    pub user_id: String,
    pub brand: String,
    pub model: String,
    pub license_plate: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub brand: String,
    pub model: String,
    pub license_plate: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVehicleRequest {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub license_plate: Option<String>,
}
