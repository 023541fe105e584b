//! Data-access interface for the marketplace.
//!
//! The engine only talks to storage through [`MarketStore`], so the search,
//! slot and lifecycle logic never depends on a particular database.
//! [`SqliteStore`] is the production implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::db::{
    Appointment, AppointmentStatus, ConversationSummary, CreateAppointmentRequest,
    CreateJobRequest, CreateProfileRequest, CreateProposalRequest, CreateReviewRequest,
    CreateServiceRequest, FreelancerProfile, Job, JobClosure, JobStatus, Message, NewUser, Proposal,
    ProposalAcceptance, Review, ReviewStats, Service, Session, UpdateProfileRequest,
    UpdateServiceRequest, UpdateUserProfileRequest, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated (duplicate username, second proposal, ...)
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Map a unique-constraint violation to [`StoreError::Conflict`]
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    // Users
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn update_user_profile(
        &self,
        id: &str,
        update: &UpdateUserProfileRequest,
    ) -> StoreResult<Option<User>>;

    // Sessions
    async fn create_session(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: &str,
    ) -> StoreResult<Session>;
    /// User owning a non-expired session
    async fn get_session_user(&self, token_hash: &str) -> StoreResult<Option<User>>;
    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool>;

    // Freelancer profiles
    async fn create_profile(
        &self,
        user_id: &str,
        request: &CreateProfileRequest,
    ) -> StoreResult<FreelancerProfile>;
    async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> StoreResult<Option<FreelancerProfile>>;
    async fn get_profile(&self, id: &str) -> StoreResult<Option<FreelancerProfile>>;
    async fn get_profile_by_user(&self, user_id: &str) -> StoreResult<Option<FreelancerProfile>>;
    /// Every profile joined with its owning user, in profile creation order
    async fn list_freelancers(&self) -> StoreResult<Vec<(FreelancerProfile, User)>>;

    // Services
    async fn create_service(
        &self,
        profile_id: &str,
        request: &CreateServiceRequest,
    ) -> StoreResult<Service>;
    async fn get_service(&self, id: &str) -> StoreResult<Option<Service>>;
    async fn list_services_for_profile(&self, profile_id: &str) -> StoreResult<Vec<Service>>;
    async fn update_service(
        &self,
        id: &str,
        request: &UpdateServiceRequest,
    ) -> StoreResult<Option<Service>>;

    // Reviews
    async fn create_review(
        &self,
        client_id: &str,
        request: &CreateReviewRequest,
    ) -> StoreResult<Review>;
    async fn list_reviews_for_profile(&self, profile_id: &str) -> StoreResult<Vec<Review>>;
    /// Rating aggregates keyed by profile id; profiles without reviews are absent
    async fn review_stats(&self, profile_ids: &[String]) -> StoreResult<HashMap<String, ReviewStats>>;

    // Appointments
    /// Insert a pending appointment unless a non-canceled one for the same
    /// service overlaps it; `None` means the range is taken
    async fn create_appointment_if_free(
        &self,
        client_id: &str,
        request: &CreateAppointmentRequest,
    ) -> StoreResult<Option<Appointment>>;
    async fn get_appointment(&self, id: &str) -> StoreResult<Option<Appointment>>;
    /// Appointments of a service overlapping `[from, to)`, any status
    async fn list_service_appointments_between(
        &self,
        service_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>>;
    async fn list_appointments_for_client(&self, client_id: &str) -> StoreResult<Vec<Appointment>>;
    /// Appointments on services owned by the freelancer user
    async fn list_appointments_for_freelancer(&self, user_id: &str)
        -> StoreResult<Vec<Appointment>>;
    /// Conditional update; `None` when the appointment is no longer in `from`
    async fn update_appointment_status(
        &self,
        id: &str,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Option<Appointment>>;

    // Jobs
    async fn create_job(&self, client_id: &str, request: &CreateJobRequest) -> StoreResult<Job>;
    async fn get_job(&self, id: &str) -> StoreResult<Option<Job>>;
    async fn list_jobs(&self, status: Option<JobStatus>) -> StoreResult<Vec<Job>>;
    async fn list_jobs_for_client(&self, client_id: &str) -> StoreResult<Vec<Job>>;
    /// Conditional update; `None` when the job is no longer in `from`
    async fn update_job_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> StoreResult<Option<Job>>;
    /// `open -> closed`, rejecting every pending proposal on the job in the
    /// same transaction. `None` when the job is not open anymore.
    async fn close_job(&self, id: &str) -> StoreResult<Option<JobClosure>>;

    // Proposals
    /// Fails with [`StoreError::Conflict`] if the freelancer already bid on the job
    async fn create_proposal(
        &self,
        job_id: &str,
        freelancer_id: &str,
        request: &CreateProposalRequest,
    ) -> StoreResult<Proposal>;
    async fn get_proposal(&self, id: &str) -> StoreResult<Option<Proposal>>;
    async fn find_proposal(&self, job_id: &str, freelancer_id: &str)
        -> StoreResult<Option<Proposal>>;
    async fn list_proposals_for_job(&self, job_id: &str) -> StoreResult<Vec<Proposal>>;
    async fn list_proposals_for_freelancer(&self, freelancer_id: &str)
        -> StoreResult<Vec<Proposal>>;
    /// `pending -> rejected`; `None` when the proposal is not pending
    async fn reject_proposal(&self, id: &str) -> StoreResult<Option<Proposal>>;
    /// Accept one proposal, start its job and reject every pending sibling in
    /// one transaction. `None` when the job is not open or the proposal is
    /// not pending anymore; nothing is written in that case.
    async fn accept_proposal(&self, id: &str) -> StoreResult<Option<ProposalAcceptance>>;

    // Messages
    async fn create_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> StoreResult<Message>;
    /// Messages between two users, oldest first
    async fn conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Vec<Message>>;
    async fn mark_conversation_read(&self, reader_id: &str, other_id: &str) -> StoreResult<u64>;
    async fn list_conversation_partners(&self, user_id: &str)
        -> StoreResult<Vec<ConversationSummary>>;
}
