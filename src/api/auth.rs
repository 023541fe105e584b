use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_coordinates, validate_email, validate_password, validate_text, validate_username,
};
use crate::db::{
    format_timestamp, LoginRequest, LoginResponse, NewUser, RegisterRequest,
    UpdateUserProfileRequest, User, UserResponse, UserType,
};
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// 32 random bytes, hex encoded
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Only this digest is stored, never the token itself
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve a raw session token to its user
pub async fn user_for_token(state: &AppState, token: &str) -> Result<Option<User>, ApiError> {
    Ok(state.store.get_session_user(&hash_token(token)).await?)
}

/// Open a session for `user` and build the login payload
async fn start_session(state: &AppState, user: User) -> Result<LoginResponse, ApiError> {
    let token = generate_token();
    let expires_at = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(state.config.auth.session_ttl_days))
        .ok_or_else(|| ApiError::internal("Session expiry out of range"))?;

    state
        .store
        .create_session(&user.id, &hash_token(&token), &format_timestamp(expires_at))
        .await?;

    Ok(LoginResponse {
        token,
        user: UserResponse::from(user),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let username = request.username.trim().to_lowercase();
    let email = request.email.trim().to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("username", validate_username(&username));
    errors.check("email", validate_email(&email));
    errors.check(
        "password",
        validate_password(&request.password, state.config.auth.min_password_length),
    );
    errors.check(
        "display_name",
        validate_text("Display name", &request.display_name, 100),
    );
    errors.check(
        "latitude",
        validate_coordinates(request.latitude, request.longitude),
    );
    let user_type = match request.user_type.parse::<UserType>() {
        Ok(t) => Some(t),
        Err(_) => {
            errors.add("user_type", "User type must be 'freelancer' or 'client'");
            None
        }
    };
    errors.finish()?;
    let user_type = user_type.ok_or_else(|| ApiError::validation_field("user_type", "required"))?;

    if state.store.get_user_by_username(&username).await?.is_some() {
        return Err(ApiError::conflict("Username is already taken"));
    }
    if state.store.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = state
        .store
        .create_user(NewUser {
            username,
            display_name: request.display_name.trim().to_string(),
            email,
            password_hash,
            user_type,
            location: request.location,
            latitude: request.latitude,
            longitude: request.longitude,
        })
        .await?;

    info!(user_id = %user.id, user_type = %user_type, "User registered");

    let response = start_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    let user = state
        .store
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    info!(user_id = %user.id, "User logged in");
    Ok(Json(start_session(&state, user).await?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = extract_token(&headers).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    state.store.delete_session(&hash_token(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<UpdateUserProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = request.display_name {
        errors.check("display_name", validate_text("Display name", name, 100));
    }
    if let Some(ref bio) = request.bio {
        if bio.chars().count() > 2000 {
            errors.add("bio", "Bio must be at most 2000 characters");
        }
    }
    // Coordinates are updated as a pair
    errors.check(
        "latitude",
        validate_coordinates(request.latitude, request.longitude),
    );
    errors.finish()?;

    let updated = state
        .store
        .update_user_profile(&user.id, &request)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(updated)))
}

/// Extractor for the user behind the `Authorization: Bearer` session token
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        user_for_token(state, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers).is_none());

        headers.insert("Authorization", "Basic abc".parse().unwrap());
        assert!(extract_token(&headers).is_none());

        headers.insert("Authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }
}
