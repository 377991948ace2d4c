use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::{Event, EventId, User, UserId};
use crate::services::auth::{hash_password, verify_password};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/auth", post(authenticate))
        .route("/users/me/booked-events", get(booked_events))
        .route("/users/me/booked-events/{event_id}", delete(cancel_booked_event))
}

/* ---------- REGISTRATION ---------- */

// POST /users
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be less than 100 characters"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
struct CreatedResponse { pub id: UserId }

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let hash = hash_password(req.password, state.config.security.bcrypt_cost).await?;

    let id = User::insert(req.name.trim(), &req.email, &hash, &state.db)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::BadRequest("Email is already registered".to_string())
            } else {
                ApiError::Database(e)
            }
        })?;

    tracing::info!(user_id = id, "User registered");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

// GET /users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let users = User::list(&state.db).await?;
    Ok(Json(json!({ "users": users })))
}

/* ---------- AUTH ---------- */

// POST /auth
#[derive(Debug, Deserialize)]
struct AuthRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse { token: String }

async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = User::find_by_email(&req.email, &state.db)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(req.password, user.password_hash).await? {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse { token }))
}

/* ---------- MY BOOKINGS ---------- */

// GET /users/me/booked-events
async fn booked_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let events = Event::booked_by(user.user_id, &state.db).await?;
    Ok(Json(json!({ "events": events })))
}

// DELETE /users/me/booked-events/{event_id}
async fn cancel_booked_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = state.bookings.release_user_tickets(event_id, user.user_id).await?;
    Ok(Json(json!({ "changes": changes })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(request("John Doe", "john@example.com", "password123").validate().is_ok());
    }

    #[test]
    fn each_rule_is_reported_by_field() {
        let errors = request("", "not-an-email", "short").validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let name = "x".repeat(101);
        assert!(request(&name, "john@example.com", "password123").validate().is_err());
    }
}
