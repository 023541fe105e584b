//! Review models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable client review of a freelancer profile
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub profile_id: String,
    pub client_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub profile_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

/// Aggregated ratings for one profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReviewStats {
    /// Arithmetic mean of ratings, 0 when there are no reviews
    pub average: f64,
    pub count: i64,
}
