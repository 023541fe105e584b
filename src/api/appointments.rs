use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{Appointment, CreateAppointmentRequest, UpdateAppointmentStatusRequest, User};
use crate::AppState;

pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    if let Some(ref notes) = request.notes {
        if notes.chars().count() > 2000 {
            return Err(ApiError::validation_field("notes", "Notes must be at most 2000 characters"));
        }
    }
    let appointment = state.lifecycle.book_appointment(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Appointments the caller booked, or those on their services for freelancers
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let appointments = if user.is_freelancer() {
        state.store.list_appointments_for_freelancer(&user.id).await?
    } else {
        state.store.list_appointments_for_client(&user.id).await?
    };
    Ok(Json(appointments))
}

pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state
        .lifecycle
        .update_appointment_status(&user, &id, request.status)
        .await?;
    Ok(Json(appointment))
}
