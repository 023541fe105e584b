//! Bookable services and their availability.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_amount, validate_text};
use crate::db::{CreateServiceRequest, Service, UpdateServiceRequest, User};
use crate::engine::Slot;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// `YYYY-MM-DD`
    pub date: String,
}

/// The service, if `user` owns it through their profile
async fn owned_service(state: &AppState, user: &User, id: &str) -> Result<Service, ApiError> {
    let service = state
        .store
        .get_service(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;
    let owns = state
        .store
        .get_profile_by_user(&user.id)
        .await?
        .is_some_and(|p| p.id == service.profile_id);
    if !owns {
        return Err(ApiError::forbidden("You can only manage your own services"));
    }
    Ok(service)
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_text("Title", &request.title, 120));
    errors.check("description", validate_text("Description", &request.description, 5000));
    errors.check("price", validate_amount("Price", request.price));
    errors.finish()?;

    let profile = state
        .store
        .get_profile_by_user(&user.id)
        .await?
        .ok_or_else(|| ApiError::forbidden("Create a freelancer profile before adding services"))?;

    let service = state.store.create_service(&profile.id, &request).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Service>, ApiError> {
    state
        .store
        .get_service(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Service not found"))
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Service>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref title) = request.title {
        errors.check("title", validate_text("Title", title, 120));
    }
    if let Some(ref description) = request.description {
        errors.check("description", validate_text("Description", description, 5000));
    }
    if let Some(price) = request.price {
        errors.check("price", validate_amount("Price", price));
    }
    errors.finish()?;

    owned_service(&state, &user, &id).await?;
    state
        .store
        .update_service(&id, &request)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Service not found"))
}

pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation_field("date", "Date must be formatted as YYYY-MM-DD"))?;

    Ok(Json(state.slots.available_slots(&id, date).await?))
}
