mod appointments;
pub mod auth;
pub mod error;
mod freelancers;
mod jobs;
mod messages;
mod reviews;
mod services;
pub mod validation;
mod ws;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me));

    // Handlers that need a user take the `User` extractor
    let api_routes = Router::new()
        // Freelancers
        .route("/freelancers/search", get(freelancers::search_freelancers))
        .route("/freelancers/:id", get(freelancers::get_freelancer))
        .route("/freelancers/:id/reviews", get(freelancers::list_freelancer_reviews))
        .route("/profiles", post(freelancers::create_profile))
        .route("/profiles/me", axum::routing::put(freelancers::update_my_profile))
        // Services
        .route("/services", post(services::create_service))
        .route(
            "/services/:id",
            get(services::get_service).put(services::update_service),
        )
        .route("/services/:id/slots", get(services::available_slots))
        // Appointments
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::book_appointment),
        )
        .route(
            "/appointments/:id/status",
            patch(appointments::update_appointment_status),
        )
        // Jobs and proposals
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/status", patch(jobs::update_job_status))
        .route(
            "/jobs/:id/proposals",
            get(jobs::list_job_proposals).post(jobs::submit_proposal),
        )
        .route("/proposals", get(jobs::list_my_proposals))
        .route("/proposals/:id/status", patch(jobs::update_proposal_status))
        // Messages
        .route(
            "/messages",
            get(messages::list_conversations).post(messages::send_message),
        )
        .route("/messages/:user_id", get(messages::get_conversation))
        // Reviews
        .route("/reviews", post(reviews::create_review))
        // Live notifications (auth happens over the socket)
        .route("/notifications/ws", get(ws::notifications_ws));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::SqliteStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let pool = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        create_router(Arc::new(AppState::new(Config::default(), store)))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, name: &str, user_type: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": name,
                "display_name": name,
                "email": format!("{}@example.com", name),
                "password": "long enough password",
                "user_type": user_type,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let app = app().await;
        let token = register(&app, "ana", "client").await;

        let (status, me) = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "ana");
        assert!(me.get("password_hash").is_none());

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ANA@example.com", "password": "wrong password!!" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = call(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicates() {
        let app = app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "x",
                "display_name": "",
                "email": "nope",
                "password": "short",
                "user_type": "admin",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["password"].is_array());

        register(&app, "ana", "client").await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "ana",
                "display_name": "Ana",
                "email": "other@example.com",
                "password": "long enough password",
                "user_type": "client",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_profile_search_and_slots() {
        let app = app().await;
        let fay = register(&app, "fay", "freelancer").await;
        let client = register(&app, "cal", "client").await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/profiles",
            Some(&client),
            Some(json!({ "title": "Nope", "category": "design", "hourly_rate": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, profile) = call(
            &app,
            "POST",
            "/api/profiles",
            Some(&fay),
            Some(json!({
                "title": "Brand designer",
                "category": "design",
                "hourly_rate": 60.0,
                "skills": ["figma", "illustrator"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let profile_id = profile["id"].as_str().unwrap().to_string();

        let (status, results) = call(
            &app,
            "GET",
            "/api/freelancers/search?category=design&minPrice=50&sortBy=price_asc",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results.as_array().unwrap().len(), 1);
        assert_eq!(results[0]["profile"]["id"], profile_id.as_str());

        let (status, _) = call(
            &app,
            "GET",
            "/api/freelancers/search?minPrice=90&maxPrice=10",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, service) = call(
            &app,
            "POST",
            "/api/services",
            Some(&fay),
            Some(json!({ "title": "Logo", "description": "A logo", "price": 200.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let service_id = service["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/appointments",
            Some(&client),
            Some(json!({
                "service_id": service_id,
                "start_time": "2026-03-09T10:00:00Z",
                "end_time": "2026-03-09T11:00:00Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, slots) = call(
            &app,
            "GET",
            &format!("/api/services/{}/slots?date=2026-03-09", service_id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let starts: Vec<&str> = slots
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["startTime"].as_str().unwrap())
            .collect();
        assert_eq!(starts.len(), 9);
        assert!(!starts.contains(&"2026-03-09T10:00:00Z"));

        let (status, _) = call(
            &app,
            "GET",
            "/api/services/missing/slots?date=2026-03-09",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/services/{}/slots?date=09-03-2026", service_id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_job_proposal_flow() {
        let app = app().await;
        let client = register(&app, "cal", "client").await;
        let fay = register(&app, "fay", "freelancer").await;
        let otto = register(&app, "otto", "freelancer").await;

        let (status, job) = call(
            &app,
            "POST",
            "/api/jobs",
            Some(&client),
            Some(json!({
                "title": "Landing page",
                "description": "One page site",
                "category": "web_development",
                "budget": 500.0,
                "location": "Remote",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let job_id = job["id"].as_str().unwrap().to_string();
        let proposals_uri = format!("/api/jobs/{}/proposals", job_id);
        let bid = json!({ "price": 450.0, "proposal": "I'll build it", "timeframe": "5 days" });

        let (_, first) = call(&app, "POST", &proposals_uri, Some(&fay), Some(bid.clone())).await;
        let (status, _) = call(&app, "POST", &proposals_uri, Some(&otto), Some(bid.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&app, "POST", &proposals_uri, Some(&fay), Some(bid)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");

        let (status, _) = call(&app, "GET", &proposals_uri, Some(&fay), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let accept_uri = format!("/api/proposals/{}/status", first["id"].as_str().unwrap());
        let (status, _) = call(
            &app,
            "PATCH",
            &accept_uri,
            Some(&fay),
            Some(json!({ "status": "accepted" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, decision) = call(
            &app,
            "PATCH",
            &accept_uri,
            Some(&client),
            Some(json!({ "status": "accepted" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decision["job"]["status"], "in_progress");
        assert_eq!(decision["accepted"]["status"], "accepted");
        assert_eq!(decision["rejected"].as_array().unwrap().len(), 1);

        let (_, jobs) = call(&app, "GET", "/api/jobs?status=in_progress", None, None).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        let (_, open) = call(&app, "GET", "/api/jobs?status=open", None, None).await;
        assert!(open.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_mark_read() {
        let app = app().await;
        let ana = register(&app, "ana", "client").await;
        let bob = register(&app, "bob", "freelancer").await;

        let (_, ana_me) = call(&app, "GET", "/api/auth/me", Some(&ana), None).await;
        let (_, bob_me) = call(&app, "GET", "/api/auth/me", Some(&bob), None).await;
        let ana_id = ana_me["id"].as_str().unwrap().to_string();
        let bob_id = bob_me["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/messages",
            Some(&ana),
            Some(json!({ "receiver_id": bob_id, "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, inbox) = call(&app, "GET", "/api/messages", Some(&bob), None).await;
        assert_eq!(inbox[0]["unread_count"], 1);

        let (status, thread) =
            call(&app, "GET", &format!("/api/messages/{}", ana_id), Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(thread[0]["content"], "hello");

        let (_, inbox) = call(&app, "GET", "/api/messages", Some(&bob), None).await;
        assert_eq!(inbox[0]["unread_count"], 0);
    }
}
