//! Job postings and the proposals made on them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_amount, validate_text};
use crate::db::{
    CreateJobRequest, CreateProposalRequest, Job, ListJobsQuery, Proposal, ProposalAcceptance,
    ProposalStatus, UpdateJobStatusRequest, UpdateProposalStatusRequest, User,
};
use crate::AppState;

/// Body of a proposal decision: acceptance carries the cascade
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProposalDecision {
    Accepted(ProposalAcceptance),
    Rejected(Proposal),
}

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    if !user.is_client() {
        return Err(ApiError::forbidden("Only clients can post jobs"));
    }

    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_text("Title", &request.title, 120));
    errors.check("description", validate_text("Description", &request.description, 5000));
    errors.check("location", validate_text("Location", &request.location, 200));
    errors.check("budget", validate_amount("Budget", request.budget));
    errors.finish()?;

    let job = state.store.create_job(&user.id, &request).await?;
    info!(job_id = %job.id, client_id = %user.id, "Job posted");
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.store.list_jobs(query.status).await?))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .store
        .get_job(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

pub async fn update_job_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobStatusRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .lifecycle
        .update_job_status(&user, &id, request.status)
        .await?;
    Ok(Json(job))
}

pub async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(job_id): Path<String>,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<Proposal>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("proposal", validate_text("Proposal", &request.proposal, 5000));
    errors.check("timeframe", validate_text("Timeframe", &request.timeframe, 100));
    errors.finish()?;

    let proposal = state.lifecycle.submit_proposal(&user, &job_id, &request).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// Proposals on a job, visible to its owner only
pub async fn list_job_proposals(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<Proposal>>, ApiError> {
    let job = state
        .store
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;
    if job.client_id != user.id {
        return Err(ApiError::forbidden("Only the job owner can view its proposals"));
    }
    Ok(Json(state.store.list_proposals_for_job(&job_id).await?))
}

pub async fn list_my_proposals(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Proposal>>, ApiError> {
    Ok(Json(state.store.list_proposals_for_freelancer(&user.id).await?))
}

pub async fn update_proposal_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(request): Json<UpdateProposalStatusRequest>,
) -> Result<Json<ProposalDecision>, ApiError> {
    let decision = match request.status {
        ProposalStatus::Accepted => {
            ProposalDecision::Accepted(state.lifecycle.accept_proposal(&user, &id).await?)
        }
        ProposalStatus::Rejected => {
            ProposalDecision::Rejected(state.lifecycle.reject_proposal(&user, &id).await?)
        }
        ProposalStatus::Pending => {
            return Err(ApiError::validation_field(
                "status",
                "Status must be 'accepted' or 'rejected'",
            ))
        }
    };
    Ok(Json(decision))
}
