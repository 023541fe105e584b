//! Status lifecycles for jobs, proposals and appointments, plus the
//! mutations that notify a counterparty (messages, bookings, reviews).
//!
//! Every successful transition produces one notification to the other side
//! of the operation, never to the actor.

use std::sync::Arc;
use tracing::info;

use super::{MarketError, MarketResult};
use crate::db::{
    Appointment, AppointmentStatus, CreateAppointmentRequest, CreateProposalRequest,
    CreateReviewRequest, FreelancerProfile, Job, JobStatus, Message, Proposal,
    ProposalAcceptance, ProposalStatus, Review, SendMessageRequest, Service, User,
};
use crate::notifications::NotificationHub;
use crate::store::MarketStore;

pub const MAX_MESSAGE_CHARS: usize = 5000;

pub struct Lifecycle {
    store: Arc<dyn MarketStore>,
    notifications: Arc<NotificationHub>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn MarketStore>, notifications: Arc<NotificationHub>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    async fn load_job(&self, job_id: &str) -> MarketResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(MarketError::NotFound("Job"))
    }

    async fn load_proposal(&self, proposal_id: &str) -> MarketResult<Proposal> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or(MarketError::NotFound("Proposal"))
    }

    /// Service and the profile that owns it
    async fn load_service(&self, service_id: &str) -> MarketResult<(Service, FreelancerProfile)> {
        let service = self
            .store
            .get_service(service_id)
            .await?
            .ok_or(MarketError::NotFound("Service"))?;
        let profile = self
            .store
            .get_profile(&service.profile_id)
            .await?
            .ok_or(MarketError::NotFound("Profile"))?;
        Ok((service, profile))
    }

    pub async fn submit_proposal(
        &self,
        actor: &User,
        job_id: &str,
        request: &CreateProposalRequest,
    ) -> MarketResult<Proposal> {
        if !actor.is_freelancer() {
            return Err(MarketError::NotAuthorized(
                "only freelancers can submit proposals".into(),
            ));
        }
        if !request.price.is_finite() || request.price <= 0.0 {
            return Err(MarketError::Validation("price must be positive".into()));
        }

        let job = self.load_job(job_id).await?;
        let status = job.get_status();
        if status != JobStatus::Open {
            return Err(MarketError::InvalidTransition(format!(
                "job is {}, proposals are only accepted while open",
                status
            )));
        }

        if let Some(existing) = self.store.find_proposal(job_id, &actor.id).await? {
            return Err(MarketError::InvalidTransition(format!(
                "a proposal for this job already exists ({})",
                existing.status
            )));
        }

        // The unique index still catches a concurrent duplicate
        let proposal = self.store.create_proposal(job_id, &actor.id, request).await?;
        info!(job_id = %job_id, proposal_id = %proposal.id, "Proposal submitted");

        self.notifications
            .notify_new_proposal(&job.client_id, &actor.id, &job.id, &job.title);
        Ok(proposal)
    }

    /// Owner-only checks shared by accept and reject
    async fn authorize_decision(
        &self,
        actor: &User,
        proposal_id: &str,
    ) -> MarketResult<(Proposal, Job)> {
        let proposal = self.load_proposal(proposal_id).await?;
        let job = self.load_job(&proposal.job_id).await?;

        if job.client_id != actor.id {
            return Err(MarketError::NotAuthorized(
                "only the job owner can decide on its proposals".into(),
            ));
        }
        let status = proposal.get_status();
        if status != ProposalStatus::Pending {
            return Err(MarketError::InvalidTransition(format!(
                "proposal is already {}",
                status
            )));
        }
        Ok((proposal, job))
    }

    /// Accept a proposal, moving its job to `in_progress` and rejecting every
    /// other pending proposal on the job
    pub async fn accept_proposal(
        &self,
        actor: &User,
        proposal_id: &str,
    ) -> MarketResult<ProposalAcceptance> {
        let (_, job) = self.authorize_decision(actor, proposal_id).await?;
        let status = job.get_status();
        if status != JobStatus::Open {
            return Err(MarketError::InvalidTransition(format!(
                "job is {}, only open jobs can accept a proposal",
                status
            )));
        }

        let acceptance = self.store.accept_proposal(proposal_id).await?.ok_or_else(|| {
            MarketError::InvalidTransition("job or proposal changed while accepting".into())
        })?;

        info!(
            job_id = %acceptance.job.id,
            proposal_id = %proposal_id,
            rejected = acceptance.rejected.len(),
            "Proposal accepted"
        );

        let title = &acceptance.job.title;
        self.notifications.notify_proposal_status(
            &acceptance.accepted.freelancer_id,
            &acceptance.accepted.id,
            title,
            ProposalStatus::Accepted.as_str(),
        );
        for rejected in &acceptance.rejected {
            self.notifications.notify_proposal_status(
                &rejected.freelancer_id,
                &rejected.id,
                title,
                ProposalStatus::Rejected.as_str(),
            );
        }

        Ok(acceptance)
    }

    pub async fn reject_proposal(&self, actor: &User, proposal_id: &str) -> MarketResult<Proposal> {
        let (_, job) = self.authorize_decision(actor, proposal_id).await?;

        let proposal = self
            .store
            .reject_proposal(proposal_id)
            .await?
            .ok_or_else(|| MarketError::InvalidTransition("proposal is no longer pending".into()))?;

        info!(job_id = %job.id, proposal_id = %proposal_id, "Proposal rejected");
        self.notifications.notify_proposal_status(
            &proposal.freelancer_id,
            &proposal.id,
            &job.title,
            ProposalStatus::Rejected.as_str(),
        );
        Ok(proposal)
    }

    pub async fn update_job_status(
        &self,
        actor: &User,
        job_id: &str,
        next: JobStatus,
    ) -> MarketResult<Job> {
        let job = self.load_job(job_id).await?;
        if job.client_id != actor.id {
            return Err(MarketError::NotAuthorized(
                "only the job owner can change its status".into(),
            ));
        }

        let current = job.get_status();
        if current.is_terminal() {
            return Err(MarketError::InvalidTransition(format!(
                "job is {} and can no longer change",
                current
            )));
        }
        // in_progress is only reachable by accepting a proposal
        if next == JobStatus::InProgress {
            return Err(MarketError::InvalidTransition(
                "accept a proposal to start the job".into(),
            ));
        }
        if !current.can_transition_to(next) {
            return Err(MarketError::InvalidTransition(format!(
                "job cannot move from {} to {}",
                current, next
            )));
        }

        if next == JobStatus::Closed {
            return self.close_job(job_id).await;
        }

        let updated = self
            .store
            .update_job_status(job_id, current, next)
            .await?
            .ok_or_else(|| MarketError::InvalidTransition("job status changed concurrently".into()))?;

        info!(job_id = %job_id, from = %current, to = %next, "Job status updated");

        let accepted = self
            .store
            .list_proposals_for_job(job_id)
            .await?
            .into_iter()
            .find(|p| p.get_status() == ProposalStatus::Accepted);
        if let Some(proposal) = accepted {
            self.notifications.notify_job_status(
                &proposal.freelancer_id,
                &updated.id,
                &updated.title,
                next.as_str(),
            );
        }

        Ok(updated)
    }

    async fn close_job(&self, job_id: &str) -> MarketResult<Job> {
        let closure = self
            .store
            .close_job(job_id)
            .await?
            .ok_or_else(|| MarketError::InvalidTransition("job status changed concurrently".into()))?;

        info!(
            job_id = %job_id,
            rejected = closure.rejected.len(),
            "Job closed"
        );

        for proposal in &closure.rejected {
            self.notifications.notify_proposal_status(
                &proposal.freelancer_id,
                &proposal.id,
                &closure.job.title,
                ProposalStatus::Rejected.as_str(),
            );
        }

        Ok(closure.job)
    }

    pub async fn book_appointment(
        &self,
        actor: &User,
        request: &CreateAppointmentRequest,
    ) -> MarketResult<Appointment> {
        if !actor.is_client() {
            return Err(MarketError::NotAuthorized(
                "only clients can book appointments".into(),
            ));
        }
        if request.end_time <= request.start_time {
            return Err(MarketError::Validation(
                "end_time must be after start_time".into(),
            ));
        }

        let (service, profile) = self.load_service(&request.service_id).await?;

        let appointment = self
            .store
            .create_appointment_if_free(&actor.id, request)
            .await?
            .ok_or(MarketError::SlotUnavailable)?;

        info!(appointment_id = %appointment.id, service_id = %service.id, "Appointment booked");
        self.notifications.notify_new_appointment(
            &profile.user_id,
            &actor.id,
            &appointment.id,
            &service.title,
            &appointment.start_time,
        );
        Ok(appointment)
    }

    /// Clients may only cancel; the service's freelancer may confirm,
    /// cancel or complete
    pub async fn update_appointment_status(
        &self,
        actor: &User,
        appointment_id: &str,
        next: AppointmentStatus,
    ) -> MarketResult<Appointment> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(MarketError::NotFound("Appointment"))?;
        let (service, profile) = self.load_service(&appointment.service_id).await?;

        let is_provider = profile.user_id == actor.id;
        let is_client = appointment.client_id == actor.id;
        let permitted = if is_provider {
            matches!(
                next,
                AppointmentStatus::Confirmed
                    | AppointmentStatus::Canceled
                    | AppointmentStatus::Completed
            )
        } else if is_client {
            next == AppointmentStatus::Canceled
        } else {
            return Err(MarketError::NotAuthorized(
                "not a participant of this appointment".into(),
            ));
        };
        if !permitted {
            return Err(MarketError::NotAuthorized(format!(
                "you cannot mark this appointment as {}",
                next
            )));
        }

        let current = appointment.get_status();
        if current.is_terminal() || current == next {
            return Err(MarketError::InvalidTransition(format!(
                "appointment cannot move from {} to {}",
                current, next
            )));
        }

        let updated = self
            .store
            .update_appointment_status(appointment_id, current, next)
            .await?
            .ok_or_else(|| {
                MarketError::InvalidTransition("appointment status changed concurrently".into())
            })?;

        info!(appointment_id = %appointment_id, from = %current, to = %next, "Appointment status updated");

        let counterparty = if is_provider {
            &appointment.client_id
        } else {
            &profile.user_id
        };
        self.notifications.notify_appointment_status(
            counterparty,
            &updated.id,
            &service.title,
            next.as_str(),
        );
        Ok(updated)
    }

    pub async fn send_message(
        &self,
        actor: &User,
        request: &SendMessageRequest,
    ) -> MarketResult<Message> {
        if request.receiver_id == actor.id {
            return Err(MarketError::Validation("cannot message yourself".into()));
        }
        if request.content.trim().is_empty() {
            return Err(MarketError::Validation("content cannot be empty".into()));
        }
        if request.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(MarketError::Validation(format!(
                "content must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        if self.store.get_user(&request.receiver_id).await?.is_none() {
            return Err(MarketError::NotFound("User"));
        }

        let message = self
            .store
            .create_message(&actor.id, &request.receiver_id, &request.content)
            .await?;

        self.notifications.notify_new_message(
            &message.receiver_id,
            &actor.id,
            &actor.display_name,
            &message.content,
        );
        Ok(message)
    }

    pub async fn submit_review(
        &self,
        actor: &User,
        request: &CreateReviewRequest,
    ) -> MarketResult<Review> {
        if !actor.is_client() {
            return Err(MarketError::NotAuthorized("only clients can leave reviews".into()));
        }
        if !(1..=5).contains(&request.rating) {
            return Err(MarketError::Validation("rating must be between 1 and 5".into()));
        }

        let profile = self
            .store
            .get_profile(&request.profile_id)
            .await?
            .ok_or(MarketError::NotFound("Profile"))?;
        if profile.user_id == actor.id {
            return Err(MarketError::NotAuthorized(
                "cannot review your own profile".into(),
            ));
        }

        let review = self.store.create_review(&actor.id, request).await?;
        info!(review_id = %review.id, profile_id = %profile.id, "Review submitted");

        self.notifications
            .notify_new_review(&profile.user_id, &actor.id, &review.id, review.rating);
        Ok(review)
    }
}
