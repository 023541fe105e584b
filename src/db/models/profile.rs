//! Freelancer profile models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::{parse_skills, Category};

/// Professional record attached 1:1 to a freelancer user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FreelancerProfile {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub category: String,
    pub hourly_rate: f64,
    /// JSON array, see [`FreelancerProfile::skill_list`]
    pub skills: String,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FreelancerProfile {
    pub fn get_category(&self) -> Category {
        Category::from(self.category.clone())
    }

    pub fn skill_list(&self) -> Vec<String> {
        parse_skills(&self.skills)
    }

    pub fn to_response(&self) -> ProfileResponse {
        ProfileResponse {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            category: self.category.clone(),
            hourly_rate: self.hourly_rate,
            skills: self.skill_list(),
            experience: self.experience.clone(),
            education: self.education.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub category: String,
    pub hourly_rate: f64,
    pub skills: Vec<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfileRequest {
    pub title: String,
    pub category: Category,
    pub hourly_rate: f64,
    #[serde(default)]
    pub skills: Vec<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub hourly_rate: Option<f64>,
    pub skills: Option<Vec<String>>,
    pub experience: Option<String>,
    pub education: Option<String>,
}
