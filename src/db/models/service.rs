//! Bookable service models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fixed-price offering owned by a freelancer profile
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: String,
    pub profile_id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceRequest {
    pub title: String,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateServiceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}
