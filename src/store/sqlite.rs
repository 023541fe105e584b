use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{conflict_on_unique, MarketStore, StoreResult};
use crate::db::{
    format_timestamp, now_timestamp, serialize_skills, Appointment, AppointmentStatus,
    ConversationSummary, CreateAppointmentRequest, CreateJobRequest, CreateProfileRequest,
    CreateProposalRequest, CreateReviewRequest, CreateServiceRequest, DbPool, FreelancerProfile,
    Job, JobClosure, JobStatus, Message, NewUser, Proposal, ProposalAcceptance, ProposalStatus,
    Review, ReviewStats, Service, Session, UpdateProfileRequest, UpdateServiceRequest,
    UpdateUserProfileRequest, User,
};

/// [`MarketStore`] backed by the SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MarketStore for SqliteStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let user_type = user.user_type.to_string();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, email, password_hash, location,
                               latitude, longitude, user_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.location)
        .bind(user.latitude)
        .bind(user.longitude)
        .bind(&user_type)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Username or email is already registered"))?;

        Ok(User {
            id,
            username: user.username,
            display_name: user.display_name,
            email: user.email,
            password_hash: user.password_hash,
            bio: None,
            location: user.location,
            latitude: user.latitude,
            longitude: user.longitude,
            user_type,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user_profile(
        &self,
        id: &str,
        update: &UpdateUserProfileRequest,
    ) -> StoreResult<Option<User>> {
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };

        if let Some(ref display_name) = update.display_name {
            user.display_name = display_name.clone();
        }
        if update.bio.is_some() {
            user.bio = update.bio.clone();
        }
        if update.location.is_some() {
            user.location = update.location.clone();
        }
        if update.latitude.is_some() {
            user.latitude = update.latitude;
        }
        if update.longitude.is_some() {
            user.longitude = update.longitude;
        }
        user.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE users
            SET display_name = ?, bio = ?, location = ?, latitude = ?, longitude = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(user.latitude)
        .bind(user.longitude)
        .bind(&user.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(user))
    }

    async fn create_session(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: &str,
    ) -> StoreResult<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: token_hash.to_string(),
            expires_at: expires_at.to_string(),
            created_at: now_timestamp(),
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_session_user(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN sessions s ON s.user_id = u.id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(token_hash)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_profile(
        &self,
        user_id: &str,
        request: &CreateProfileRequest,
    ) -> StoreResult<FreelancerProfile> {
        let now = now_timestamp();
        let profile = FreelancerProfile {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: request.title.clone(),
            category: request.category.to_string(),
            hourly_rate: request.hourly_rate,
            skills: serialize_skills(&request.skills),
            experience: request.experience.clone(),
            education: request.education.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO freelancer_profiles (id, user_id, title, category, hourly_rate, skills,
                                             experience, education, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.user_id)
        .bind(&profile.title)
        .bind(&profile.category)
        .bind(profile.hourly_rate)
        .bind(&profile.skills)
        .bind(&profile.experience)
        .bind(&profile.education)
        .bind(&profile.created_at)
        .bind(&profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User already has a freelancer profile"))?;

        Ok(profile)
    }

    async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> StoreResult<Option<FreelancerProfile>> {
        let Some(mut profile) = self.get_profile(id).await? else {
            return Ok(None);
        };

        if let Some(ref title) = request.title {
            profile.title = title.clone();
        }
        if let Some(category) = request.category {
            profile.category = category.to_string();
        }
        if let Some(rate) = request.hourly_rate {
            profile.hourly_rate = rate;
        }
        if let Some(ref skills) = request.skills {
            profile.skills = serialize_skills(skills);
        }
        if request.experience.is_some() {
            profile.experience = request.experience.clone();
        }
        if request.education.is_some() {
            profile.education = request.education.clone();
        }
        profile.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE freelancer_profiles
            SET title = ?, category = ?, hourly_rate = ?, skills = ?, experience = ?,
                education = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.title)
        .bind(&profile.category)
        .bind(profile.hourly_rate)
        .bind(&profile.skills)
        .bind(&profile.experience)
        .bind(&profile.education)
        .bind(&profile.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(profile))
    }

    async fn get_profile(&self, id: &str) -> StoreResult<Option<FreelancerProfile>> {
        let profile =
            sqlx::query_as::<_, FreelancerProfile>("SELECT * FROM freelancer_profiles WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn get_profile_by_user(&self, user_id: &str) -> StoreResult<Option<FreelancerProfile>> {
        let profile = sqlx::query_as::<_, FreelancerProfile>(
            "SELECT * FROM freelancer_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn list_freelancers(&self) -> StoreResult<Vec<(FreelancerProfile, User)>> {
        let profiles = sqlx::query_as::<_, FreelancerProfile>(
            "SELECT * FROM freelancer_profiles ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let users = sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u JOIN freelancer_profiles p ON p.user_id = u.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut users_by_id: HashMap<String, User> =
            users.into_iter().map(|u| (u.id.clone(), u)).collect();

        Ok(profiles
            .into_iter()
            .filter_map(|profile| {
                let user = users_by_id.remove(&profile.user_id)?;
                Some((profile, user))
            })
            .collect())
    }

    async fn create_service(
        &self,
        profile_id: &str,
        request: &CreateServiceRequest,
    ) -> StoreResult<Service> {
        let now = now_timestamp();
        let service = Service {
            id: Uuid::new_v4().to_string(),
            profile_id: profile_id.to_string(),
            title: request.title.clone(),
            description: request.description.clone(),
            price: request.price,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO services (id, profile_id, title, description, price, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&service.id)
        .bind(&service.profile_id)
        .bind(&service.title)
        .bind(&service.description)
        .bind(service.price)
        .bind(&service.created_at)
        .bind(&service.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(service)
    }

    async fn get_service(&self, id: &str) -> StoreResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    async fn list_services_for_profile(&self, profile_id: &str) -> StoreResult<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE profile_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(services)
    }

    async fn update_service(
        &self,
        id: &str,
        request: &UpdateServiceRequest,
    ) -> StoreResult<Option<Service>> {
        let Some(mut service) = self.get_service(id).await? else {
            return Ok(None);
        };

        if let Some(ref title) = request.title {
            service.title = title.clone();
        }
        if let Some(ref description) = request.description {
            service.description = description.clone();
        }
        if let Some(price) = request.price {
            service.price = price;
        }
        service.updated_at = now_timestamp();

        sqlx::query(
            "UPDATE services SET title = ?, description = ?, price = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&service.title)
        .bind(&service.description)
        .bind(service.price)
        .bind(&service.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(service))
    }

    async fn create_review(
        &self,
        client_id: &str,
        request: &CreateReviewRequest,
    ) -> StoreResult<Review> {
        let review = Review {
            id: Uuid::new_v4().to_string(),
            profile_id: request.profile_id.clone(),
            client_id: client_id.to_string(),
            rating: request.rating,
            comment: request.comment.clone(),
            created_at: now_timestamp(),
        };

        sqlx::query(
            r#"
            INSERT INTO reviews (id, profile_id, client_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.profile_id)
        .bind(&review.client_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(&review.created_at)
        .execute(&self.pool)
        .await?;

        Ok(review)
    }

    async fn list_reviews_for_profile(&self, profile_id: &str) -> StoreResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews WHERE profile_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn review_stats(
        &self,
        profile_ids: &[String],
    ) -> StoreResult<HashMap<String, ReviewStats>> {
        if profile_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT profile_id, AVG(CAST(rating AS REAL)), COUNT(*) FROM reviews WHERE profile_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in profile_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") GROUP BY profile_id");

        let rows: Vec<(String, f64, i64)> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(profile_id, average, count)| (profile_id, ReviewStats { average, count }))
            .collect())
    }

    async fn create_appointment_if_free(
        &self,
        client_id: &str,
        request: &CreateAppointmentRequest,
    ) -> StoreResult<Option<Appointment>> {
        let now = now_timestamp();
        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            service_id: request.service_id.clone(),
            client_id: client_id.to_string(),
            start_time: format_timestamp(request.start_time),
            end_time: format_timestamp(request.end_time),
            status: AppointmentStatus::Pending.to_string(),
            notes: request.notes.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        // Single statement, so the overlap check and the insert can't interleave
        let result = sqlx::query(
            r#"
            INSERT INTO appointments (id, service_id, client_id, start_time, end_time, status,
                                      notes, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM appointments
                WHERE service_id = ? AND status != 'canceled' AND start_time < ? AND end_time > ?
            )
            "#,
        )
        .bind(&appointment.id)
        .bind(&appointment.service_id)
        .bind(&appointment.client_id)
        .bind(&appointment.start_time)
        .bind(&appointment.end_time)
        .bind(&appointment.status)
        .bind(&appointment.notes)
        .bind(&appointment.created_at)
        .bind(&appointment.updated_at)
        .bind(&appointment.service_id)
        .bind(&appointment.end_time)
        .bind(&appointment.start_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(service_id = %appointment.service_id, "Requested range overlaps an appointment");
            return Ok(None);
        }
        Ok(Some(appointment))
    }

    async fn get_appointment(&self, id: &str) -> StoreResult<Option<Appointment>> {
        let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(appointment)
    }

    async fn list_service_appointments_between(
        &self,
        service_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>> {
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE service_id = ? AND start_time < ? AND end_time > ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(service_id)
        .bind(format_timestamp(to))
        .bind(format_timestamp(from))
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn list_appointments_for_client(&self, client_id: &str) -> StoreResult<Vec<Appointment>> {
        let appointments = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE client_id = ? ORDER BY start_time ASC",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn list_appointments_for_freelancer(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<Appointment>> {
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT a.* FROM appointments a
            JOIN services s ON s.id = a.service_id
            JOIN freelancer_profiles p ON p.id = s.profile_id
            WHERE p.user_id = ?
            ORDER BY a.start_time ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Option<Appointment>> {
        let result = sqlx::query(
            "UPDATE appointments SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now_timestamp())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_appointment(id).await
    }

    async fn create_job(&self, client_id: &str, request: &CreateJobRequest) -> StoreResult<Job> {
        let now = now_timestamp();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            title: request.title.clone(),
            description: request.description.clone(),
            category: request.category.to_string(),
            budget: request.budget,
            location: request.location.clone(),
            deadline: request.deadline.clone(),
            status: JobStatus::Open.to_string(),
            contact_info: request.contact_info.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (id, client_id, title, description, category, budget, location,
                              deadline, status, contact_info, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.client_id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.category)
        .bind(job.budget)
        .bind(&job.location)
        .bind(&job.deadline)
        .bind(&job.status)
        .bind(&job.contact_info)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> StoreResult<Vec<Job>> {
        let jobs = match status {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC, rowid DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(jobs)
    }

    async fn list_jobs_for_client(&self, client_id: &str) -> StoreResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE client_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn update_job_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> StoreResult<Option<Job>> {
        let result =
            sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(now_timestamp())
                .bind(id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_job(id).await
    }

    async fn close_job(&self, id: &str) -> StoreResult<Option<JobClosure>> {
        let mut tx = self.pool.begin().await?;
        let now = now_timestamp();

        let job_update = sqlx::query(
            "UPDATE jobs SET status = 'closed', updated_at = ? WHERE id = ? AND status = 'open'",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if job_update.rows_affected() == 0 {
            return Ok(None);
        }

        let mut rejected = sqlx::query_as::<_, Proposal>(
            r#"
            SELECT * FROM proposals
            WHERE job_id = ? AND status = 'pending'
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE proposals SET status = 'rejected', updated_at = ? WHERE job_id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        for proposal in &mut rejected {
            proposal.status = ProposalStatus::Rejected.to_string();
            proposal.updated_at = now.clone();
        }
        Ok(Some(JobClosure { job, rejected }))
    }

    async fn create_proposal(
        &self,
        job_id: &str,
        freelancer_id: &str,
        request: &CreateProposalRequest,
    ) -> StoreResult<Proposal> {
        let now = now_timestamp();
        let proposal = Proposal {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            freelancer_id: freelancer_id.to_string(),
            price: request.price,
            proposal: request.proposal.clone(),
            timeframe: request.timeframe.clone(),
            status: ProposalStatus::Pending.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO proposals (id, job_id, freelancer_id, price, proposal, timeframe, status,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proposal.id)
        .bind(&proposal.job_id)
        .bind(&proposal.freelancer_id)
        .bind(proposal.price)
        .bind(&proposal.proposal)
        .bind(&proposal.timeframe)
        .bind(&proposal.status)
        .bind(&proposal.created_at)
        .bind(&proposal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Freelancer already submitted a proposal for this job"))?;

        Ok(proposal)
    }

    async fn get_proposal(&self, id: &str) -> StoreResult<Option<Proposal>> {
        let proposal = sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(proposal)
    }

    async fn find_proposal(
        &self,
        job_id: &str,
        freelancer_id: &str,
    ) -> StoreResult<Option<Proposal>> {
        let proposal = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE job_id = ? AND freelancer_id = ?",
        )
        .bind(job_id)
        .bind(freelancer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(proposal)
    }

    async fn list_proposals_for_job(&self, job_id: &str) -> StoreResult<Vec<Proposal>> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE job_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(proposals)
    }

    async fn list_proposals_for_freelancer(
        &self,
        freelancer_id: &str,
    ) -> StoreResult<Vec<Proposal>> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE freelancer_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(freelancer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(proposals)
    }

    async fn reject_proposal(&self, id: &str) -> StoreResult<Option<Proposal>> {
        let result = sqlx::query(
            "UPDATE proposals SET status = 'rejected', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_proposal(id).await
    }

    async fn accept_proposal(&self, id: &str) -> StoreResult<Option<ProposalAcceptance>> {
        let mut tx = self.pool.begin().await?;
        let now = now_timestamp();

        // The transaction opens with its write so a competing acceptance
        // waits on the lock instead of holding a stale read snapshot
        let job_update = sqlx::query(
            r#"
            UPDATE jobs SET status = 'in_progress', updated_at = ?
            WHERE status = 'open'
              AND id = (SELECT job_id FROM proposals WHERE id = ? AND status = 'pending')
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if job_update.rows_affected() == 0 {
            return Ok(None);
        }

        let mut accepted = sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE proposals SET status = 'accepted', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let mut rejected = sqlx::query_as::<_, Proposal>(
            r#"
            SELECT * FROM proposals
            WHERE job_id = ? AND id != ? AND status = 'pending'
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(&accepted.job_id)
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE proposals SET status = 'rejected', updated_at = ?
            WHERE job_id = ? AND id != ? AND status = 'pending'
            "#,
        )
        .bind(&now)
        .bind(&accepted.job_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(&accepted.job_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        accepted.status = ProposalStatus::Accepted.to_string();
        accepted.updated_at = now.clone();
        for sibling in &mut rejected {
            sibling.status = ProposalStatus::Rejected.to_string();
            sibling.updated_at = now.clone();
        }

        Ok(Some(ProposalAcceptance {
            job,
            accepted,
            rejected,
        }))
    }

    async fn create_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> StoreResult<Message> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            is_read: false,
            created_at: now_timestamp(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, is_read, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(&message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn mark_conversation_read(&self, reader_id: &str, other_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE receiver_id = ? AND sender_id = ? AND is_read = 0",
        )
        .bind(reader_id)
        .bind(other_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_conversation_partners(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<ConversationSummary>> {
        let partners = sqlx::query_as::<_, ConversationSummary>(
            r#"
            SELECT other.id AS user_id,
                   other.display_name AS display_name,
                   MAX(m.created_at) AS last_message_at,
                   SUM(CASE WHEN m.receiver_id = ? AND m.is_read = 0 THEN 1 ELSE 0 END) AS unread_count
            FROM messages m
            JOIN users other
              ON other.id = CASE WHEN m.sender_id = ? THEN m.receiver_id ELSE m.sender_id END
            WHERE m.sender_id = ? OR m.receiver_id = ?
            GROUP BY other.id, other.display_name
            ORDER BY last_message_at DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(partners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Category, UserType};
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        let pool = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        SqliteStore::new(pool)
    }

    fn new_user(name: &str, user_type: UserType) -> NewUser {
        NewUser {
            username: name.to_string(),
            display_name: name.to_uppercase(),
            email: format!("{}@example.com", name),
            password_hash: "hash".to_string(),
            user_type,
            location: None,
            latitude: None,
            longitude: None,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_user_is_conflict() {
        let store = store().await;
        store.create_user(new_user("ana", UserType::Client)).await.unwrap();
        let err = store
            .create_user(new_user("ana", UserType::Client))
            .await
            .unwrap_err();
        assert!(matches!(err, super::super::StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let store = store().await;
        let user = store.create_user(new_user("ana", UserType::Client)).await.unwrap();

        store.create_session(&user.id, "live", "2999-01-01T00:00:00Z").await.unwrap();
        store.create_session(&user.id, "stale", "2000-01-01T00:00:00Z").await.unwrap();

        assert!(store.get_session_user("live").await.unwrap().is_some());
        assert!(store.get_session_user("stale").await.unwrap().is_none());
        assert!(store.delete_session("live").await.unwrap());
        assert!(store.get_session_user("live").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_freelancers_joins_users_in_creation_order() {
        let store = store().await;
        let mut expected = Vec::new();
        for name in ["zed", "amy", "bob"] {
            let user = store.create_user(new_user(name, UserType::Freelancer)).await.unwrap();
            let profile = store
                .create_profile(
                    &user.id,
                    &CreateProfileRequest {
                        title: format!("{} title", name),
                        category: Category::Design,
                        hourly_rate: 50.0,
                        skills: vec!["figma".into(), "figma".into()],
                        experience: None,
                        education: None,
                    },
                )
                .await
                .unwrap();
            expected.push(profile.id);
        }

        let listed = store.list_freelancers().await.unwrap();
        let ids: Vec<String> = listed.iter().map(|(p, _)| p.id.clone()).collect();
        assert_eq!(ids, expected);
        assert_eq!(listed[0].1.username, "zed");
        assert_eq!(listed[0].0.skill_list(), vec!["figma", "figma"]);
    }

    #[tokio::test]
    async fn test_review_stats_average_and_count() {
        let store = store().await;
        let freelancer = store.create_user(new_user("fay", UserType::Freelancer)).await.unwrap();
        let client = store.create_user(new_user("cal", UserType::Client)).await.unwrap();
        let profile = store
            .create_profile(
                &freelancer.id,
                &CreateProfileRequest {
                    title: "Designer".into(),
                    category: Category::Design,
                    hourly_rate: 40.0,
                    skills: vec![],
                    experience: None,
                    education: None,
                },
            )
            .await
            .unwrap();

        for rating in [5, 4] {
            store
                .create_review(
                    &client.id,
                    &CreateReviewRequest {
                        profile_id: profile.id.clone(),
                        rating,
                        comment: None,
                    },
                )
                .await
                .unwrap();
        }

        let stats = store
            .review_stats(&[profile.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        let entry = stats.get(&profile.id).unwrap();
        assert!((entry.average - 4.5).abs() < 1e-9);
        assert_eq!(entry.count, 2);
        assert!(!stats.contains_key("missing"));
        assert!(store.review_stats(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_booking_is_refused() {
        let store = store().await;
        let freelancer = store.create_user(new_user("fay", UserType::Freelancer)).await.unwrap();
        let client = store.create_user(new_user("cal", UserType::Client)).await.unwrap();
        let profile = store
            .create_profile(
                &freelancer.id,
                &CreateProfileRequest {
                    title: "Tutor".into(),
                    category: Category::Consulting,
                    hourly_rate: 30.0,
                    skills: vec![],
                    experience: None,
                    education: None,
                },
            )
            .await
            .unwrap();
        let service = store
            .create_service(
                &profile.id,
                &CreateServiceRequest {
                    title: "Lesson".into(),
                    description: "One hour".into(),
                    price: 30.0,
                },
            )
            .await
            .unwrap();

        let request = |start: DateTime<Utc>, end: DateTime<Utc>| CreateAppointmentRequest {
            service_id: service.id.clone(),
            start_time: start,
            end_time: end,
            notes: None,
        };

        let first = store
            .create_appointment_if_free(&client.id, &request(at(10, 0), at(11, 0)))
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .create_appointment_if_free(&client.id, &request(at(10, 30), at(11, 30)))
            .await
            .unwrap()
            .is_none());
        // Touching ranges don't overlap
        assert!(store
            .create_appointment_if_free(&client.id, &request(at(11, 0), at(12, 0)))
            .await
            .unwrap()
            .is_some());

        store
            .update_appointment_status(&first.id, AppointmentStatus::Pending, AppointmentStatus::Canceled)
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .create_appointment_if_free(&client.id, &request(at(10, 0), at(11, 0)))
            .await
            .unwrap()
            .is_some());

        let day = store
            .list_service_appointments_between(&service.id, at(0, 0), at(23, 59))
            .await
            .unwrap();
        assert_eq!(day.len(), 3);
        assert_eq!(store.list_appointments_for_freelancer(&freelancer.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_conversation_and_read_tracking() {
        let store = store().await;
        let a = store.create_user(new_user("ana", UserType::Client)).await.unwrap();
        let b = store.create_user(new_user("bob", UserType::Freelancer)).await.unwrap();

        store.create_message(&a.id, &b.id, "hi").await.unwrap();
        store.create_message(&b.id, &a.id, "hello").await.unwrap();
        store.create_message(&a.id, &b.id, "are you free?").await.unwrap();

        let thread = store.conversation(&b.id, &a.id).await.unwrap();
        let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "are you free?"]);

        let partners = store.list_conversation_partners(&b.id).await.unwrap();
        assert_eq!(partners.len(), 1);
        assert_eq!(partners[0].user_id, a.id);
        assert_eq!(partners[0].unread_count, 2);

        assert_eq!(store.mark_conversation_read(&b.id, &a.id).await.unwrap(), 2);
        assert_eq!(store.mark_conversation_read(&b.id, &a.id).await.unwrap(), 0);
    }

    async fn file_store(dir: &tempfile::TempDir) -> SqliteStore {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("market.db").display());
        let pool = crate::db::connect(&url, 5).await.unwrap();
        SqliteStore::new(pool)
    }

    fn job_request(title: &str) -> CreateJobRequest {
        CreateJobRequest {
            title: title.into(),
            description: "Needs doing".into(),
            category: Category::Design,
            budget: 200.0,
            location: "Remote".into(),
            deadline: None,
            contact_info: None,
        }
    }

    fn bid() -> CreateProposalRequest {
        CreateProposalRequest {
            price: 150.0,
            proposal: "Ready to start".into(),
            timeframe: "3 days".into(),
        }
    }

    #[tokio::test]
    async fn test_close_job_rejects_pending_proposals_once() {
        let store = store().await;
        let client = store.create_user(new_user("cal", UserType::Client)).await.unwrap();
        let fay = store.create_user(new_user("fay", UserType::Freelancer)).await.unwrap();
        let job = store.create_job(&client.id, &job_request("Poster")).await.unwrap();
        let proposal = store.create_proposal(&job.id, &fay.id, &bid()).await.unwrap();

        let closure = store.close_job(&job.id).await.unwrap().unwrap();
        assert_eq!(closure.job.get_status(), JobStatus::Closed);
        assert_eq!(closure.rejected.len(), 1);
        assert_eq!(closure.rejected[0].id, proposal.id);
        assert_eq!(closure.rejected[0].get_status(), ProposalStatus::Rejected);

        assert!(store.close_job(&job.id).await.unwrap().is_none());
        assert!(store.accept_proposal(&proposal.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_acceptances_on_shared_file_accept_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;
        let client = store.create_user(new_user("cal", UserType::Client)).await.unwrap();
        let fay = store.create_user(new_user("fay", UserType::Freelancer)).await.unwrap();
        let gus = store.create_user(new_user("gus", UserType::Freelancer)).await.unwrap();

        for round in 0..20 {
            let job = store
                .create_job(&client.id, &job_request(&format!("Job {}", round)))
                .await
                .unwrap();
            let first = store.create_proposal(&job.id, &fay.id, &bid()).await.unwrap();
            let second = store.create_proposal(&job.id, &gus.id, &bid()).await.unwrap();

            let a = tokio::spawn({
                let store = store.clone();
                async move { store.accept_proposal(&first.id).await }
            });
            let b = tokio::spawn({
                let store = store.clone();
                async move { store.accept_proposal(&second.id).await }
            });
            let (a, b) = tokio::join!(a, b);
            let a = a.unwrap().expect("acceptance must not fail on lock contention");
            let b = b.unwrap().expect("acceptance must not fail on lock contention");
            assert_eq!(
                a.is_some() as u8 + b.is_some() as u8,
                1,
                "round {}: exactly one acceptance wins",
                round
            );

            let job = store.get_job(&job.id).await.unwrap().unwrap();
            assert_eq!(job.get_status(), JobStatus::InProgress);
            let statuses: Vec<ProposalStatus> = store
                .list_proposals_for_job(&job.id)
                .await
                .unwrap()
                .iter()
                .map(|p| p.get_status())
                .collect();
            assert_eq!(
                statuses.iter().filter(|s| **s == ProposalStatus::Accepted).count(),
                1
            );
            assert_eq!(
                statuses.iter().filter(|s| **s == ProposalStatus::Rejected).count(),
                1
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_overlapping_bookings_on_shared_file_book_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;
        let freelancer = store.create_user(new_user("fay", UserType::Freelancer)).await.unwrap();
        let client = store.create_user(new_user("cal", UserType::Client)).await.unwrap();
        let profile = store
            .create_profile(
                &freelancer.id,
                &CreateProfileRequest {
                    title: "Tutor".into(),
                    category: Category::Consulting,
                    hourly_rate: 30.0,
                    skills: vec![],
                    experience: None,
                    education: None,
                },
            )
            .await
            .unwrap();
        let service = store
            .create_service(
                &profile.id,
                &CreateServiceRequest {
                    title: "Lesson".into(),
                    description: "One hour".into(),
                    price: 30.0,
                },
            )
            .await
            .unwrap();

        for hour in 8..18 {
            let early = CreateAppointmentRequest {
                service_id: service.id.clone(),
                start_time: at(hour, 0),
                end_time: at(hour + 1, 0),
                notes: None,
            };
            let late = CreateAppointmentRequest {
                start_time: at(hour, 30),
                end_time: at(hour + 1, 0),
                ..early.clone()
            };

            let a = tokio::spawn({
                let (store, client_id) = (store.clone(), client.id.clone());
                async move { store.create_appointment_if_free(&client_id, &early).await }
            });
            let b = tokio::spawn({
                let (store, client_id) = (store.clone(), client.id.clone());
                async move { store.create_appointment_if_free(&client_id, &late).await }
            });
            let (a, b) = tokio::join!(a, b);
            let a = a.unwrap().expect("booking must not fail on lock contention");
            let b = b.unwrap().expect("booking must not fail on lock contention");
            assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1, "hour {}", hour);
        }

        let booked = store
            .list_service_appointments_between(&service.id, at(0, 0), at(23, 59))
            .await
            .unwrap();
        assert_eq!(booked.len(), 10);
    }
}
