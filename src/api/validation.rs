//! Input validation for API requests.
//!
//! Field validators return `Err(message)` and are collected with
//! [`ValidationErrorBuilder`] so a request reports every bad field at once.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::Category;
use crate::engine::{SearchCriteria, SortBy};

lazy_static! {
    /// Lowercase letters, digits, `_` and `-`, 3-30 chars
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-z0-9_-]{3,30}$").unwrap();

    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-30 characters of lowercase letters, digits, '_' or '-'".to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), String> {
    if password.chars().count() < min_length {
        return Err(format!("Password must be at least {} characters", min_length));
    }
    Ok(())
}

/// Non-blank text of at most `max` characters
pub fn validate_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

pub fn validate_amount(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", field));
    }
    Ok(())
}

pub fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), String> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err("Latitude must be between -90 and 90".to_string());
            }
            if !(-180.0..=180.0).contains(&lon) {
                return Err("Longitude must be between -180 and 180".to_string());
            }
            Ok(())
        }
        _ => Err("Latitude and longitude must be provided together".to_string()),
    }
}

pub fn validate_skills(skills: &[String]) -> Result<(), String> {
    if skills.len() > 50 {
        return Err("At most 50 skills are allowed".to_string());
    }
    if skills.iter().any(|s| s.trim().is_empty() || s.chars().count() > 50) {
        return Err("Skills must be non-empty and at most 50 characters".to_string());
    }
    Ok(())
}

/// Raw `/api/freelancers/search` query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub min_rating: Option<String>,
    pub max_distance: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub sort_by: Option<String>,
}

/// Empty parameters count as absent
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    value: Option<String>,
) -> Option<f64> {
    let raw = present(value)?;
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => {
            errors.add(field, format!("{} must be a number", field));
            None
        }
    }
}

impl SearchQuery {
    pub fn into_criteria(self) -> Result<SearchCriteria, ApiError> {
        let mut errors = ValidationErrorBuilder::new();

        let category = present(self.category).and_then(|raw| match raw.parse::<Category>() {
            Ok(c) => Some(c),
            Err(e) => {
                errors.add("category", e);
                None
            }
        });
        let sort_by = present(self.sort_by).and_then(|raw| match raw.parse::<SortBy>() {
            Ok(s) => Some(s),
            Err(e) => {
                errors.add("sortBy", e);
                None
            }
        });

        let min_price = parse_number(&mut errors, "minPrice", self.min_price);
        let max_price = parse_number(&mut errors, "maxPrice", self.max_price);
        let min_rating = parse_number(&mut errors, "minRating", self.min_rating);
        let max_distance = parse_number(&mut errors, "maxDistance", self.max_distance);
        let latitude = parse_number(&mut errors, "latitude", self.latitude);
        let longitude = parse_number(&mut errors, "longitude", self.longitude);

        if let Some(min) = min_price {
            errors.check("minPrice", validate_amount("minPrice", min));
        }
        if let Some(max) = max_price {
            errors.check("maxPrice", validate_amount("maxPrice", max));
        }
        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                errors.add("minPrice", "minPrice must not exceed maxPrice");
            }
        }
        if min_rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            errors.add("minRating", "minRating must be between 0 and 5");
        }
        if let Some(distance) = max_distance {
            errors.check("maxDistance", validate_amount("maxDistance", distance));
        }
        errors.check("latitude", validate_coordinates(latitude, longitude));

        errors.finish()?;

        Ok(SearchCriteria {
            query: present(self.query),
            category,
            location: present(self.location),
            min_price,
            max_price,
            min_rating,
            max_distance,
            latitude,
            longitude,
            sort_by,
        })
    }
}
