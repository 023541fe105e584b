//! Proposal (bid on a job) models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Rejected)
        )
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown proposal status: {}", s)),
        }
    }
}

impl From<String> for ProposalStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Self::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Proposal {
    pub id: String,
    pub job_id: String,
    /// User id of the bidding freelancer
    pub freelancer_id: String,
    pub price: f64,
    pub proposal: String,
    pub timeframe: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Proposal {
    pub fn get_status(&self) -> ProposalStatus {
        ProposalStatus::from(self.status.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProposalRequest {
    pub price: f64,
    pub proposal: String,
    pub timeframe: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProposalStatusRequest {
    pub status: ProposalStatus,
}

/// Outcome of accepting a proposal: the job moved to `in_progress` and every
/// sibling that was still pending got rejected in the same transaction
#[derive(Debug, Clone, Serialize)]
pub struct ProposalAcceptance {
    pub job: super::job::Job,
    pub accepted: Proposal,
    pub rejected: Vec<Proposal>,
}
