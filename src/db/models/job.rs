//! Job posting models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::Category;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    InProgress,
    Completed,
    Closed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    /// `open -> in_progress -> completed` and `open -> closed`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress)
                | (Self::Open, Self::Closed)
                | (Self::InProgress, Self::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Closed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        // Unknown values are treated as terminal so they can't receive proposals
        s.parse().unwrap_or(Self::Closed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: f64,
    pub location: String,
    pub deadline: Option<String>,
    pub status: String,
    pub contact_info: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn get_status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }

    pub fn get_category(&self) -> Category {
        Category::from(self.category.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub budget: f64,
    pub location: String,
    pub deadline: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
}

/// Outcome of closing an open job: every proposal still pending on it was
/// rejected in the same transaction
#[derive(Debug, Clone, Serialize)]
pub struct JobClosure {
    pub job: Job,
    pub rejected: Vec<super::proposal::Proposal>,
}
