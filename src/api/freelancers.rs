use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_amount, validate_skills, validate_text, SearchQuery};
use crate::db::{
    CreateProfileRequest, ProfileResponse, Review, ReviewStats, Service, UpdateProfileRequest,
    User, UserResponse,
};
use crate::engine::FreelancerResult;
use crate::AppState;

/// Full public view of one freelancer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreelancerDetail {
    pub profile: ProfileResponse,
    pub user: UserResponse,
    pub services: Vec<Service>,
    pub avg_rating: f64,
    pub review_count: i64,
}

pub async fn search_freelancers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<FreelancerResult>>, ApiError> {
    let criteria = query.into_criteria()?;
    let results = state.search.search(&criteria).await?;
    Ok(Json(results))
}

pub async fn get_freelancer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FreelancerDetail>, ApiError> {
    let profile = state
        .store
        .get_profile(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Freelancer not found"))?;
    let user = state
        .store
        .get_user(&profile.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Freelancer not found"))?;

    let services = state.store.list_services_for_profile(&profile.id).await?;
    let stats = state
        .store
        .review_stats(std::slice::from_ref(&profile.id))
        .await?
        .remove(&profile.id)
        .unwrap_or(ReviewStats::default());

    Ok(Json(FreelancerDetail {
        profile: profile.to_response(),
        user: UserResponse::from(user),
        services,
        avg_rating: stats.average,
        review_count: stats.count,
    }))
}

pub async fn list_freelancer_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    if state.store.get_profile(&id).await?.is_none() {
        return Err(ApiError::not_found("Freelancer not found"));
    }
    Ok(Json(state.store.list_reviews_for_profile(&id).await?))
}

fn validate_profile_fields(
    title: Option<&str>,
    hourly_rate: Option<f64>,
    skills: Option<&[String]>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(title) = title {
        errors.check("title", validate_text("Title", title, 120));
    }
    if let Some(rate) = hourly_rate {
        errors.check("hourly_rate", validate_amount("Hourly rate", rate));
    }
    if let Some(skills) = skills {
        errors.check("skills", validate_skills(skills));
    }
    errors.finish()
}

pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), ApiError> {
    if !user.is_freelancer() {
        return Err(ApiError::forbidden("Only freelancers can create a profile"));
    }
    validate_profile_fields(
        Some(&request.title),
        Some(request.hourly_rate),
        Some(&request.skills),
    )?;

    if state.store.get_profile_by_user(&user.id).await?.is_some() {
        return Err(ApiError::conflict("Freelancer profile already exists"));
    }

    let profile = state.store.create_profile(&user.id, &request).await?;
    info!(user_id = %user.id, profile_id = %profile.id, "Freelancer profile created");
    Ok((StatusCode::CREATED, Json(profile.to_response())))
}

pub async fn update_my_profile(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    validate_profile_fields(
        request.title.as_deref(),
        request.hourly_rate,
        request.skills.as_deref(),
    )?;

    let profile = state
        .store
        .get_profile_by_user(&user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("You don't have a freelancer profile"))?;

    let updated = state
        .store
        .update_profile(&profile.id, &request)
        .await?
        .ok_or_else(|| ApiError::not_found("Freelancer profile not found"))?;

    Ok(Json(updated.to_response()))
}
