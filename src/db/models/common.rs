//! Common types and utilities shared across models.

use serde::{Deserialize, Serialize};

/// Closed set of marketplace categories used by profiles and jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WebDevelopment,
    MobileDevelopment,
    Design,
    Writing,
    Marketing,
    DataScience,
    VideoEditing,
    Photography,
    Consulting,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Self::WebDevelopment,
        Self::MobileDevelopment,
        Self::Design,
        Self::Writing,
        Self::Marketing,
        Self::DataScience,
        Self::VideoEditing,
        Self::Photography,
        Self::Consulting,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebDevelopment => "web_development",
            Self::MobileDevelopment => "mobile_development",
            Self::Design => "design",
            Self::Writing => "writing",
            Self::Marketing => "marketing",
            Self::DataScience => "data_science",
            Self::VideoEditing => "video_editing",
            Self::Photography => "photography",
            Self::Consulting => "consulting",
            Self::Other => "other",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// Helper to parse a skills JSON array from the database
pub fn parse_skills(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Helper to serialize skills to JSON for the database
pub fn serialize_skills(skills: &[String]) -> String {
    serde_json::to_string(skills).unwrap_or_else(|_| "[]".to_string())
}
