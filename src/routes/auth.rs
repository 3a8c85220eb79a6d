//! Registration, login, and profile.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, issue_token, verify_password, AuthUser};
use crate::domain::User;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me).put(update_me))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email"))]
    pub email: String,
    #[validate(length(min = 8, max = 100, message = "password must be 8-100 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

async fn register(
    State(s): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    req.validate()?;
    tracing::info!(email = %req.email, "registering user");

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(&req.email)
        .fetch_one(&s.db)
        .await?;
    if exists {
        return Err(ApiError::Conflict(format!("email already registered: {}", req.email)));
    }

    let password_hash = hash_password(&req.password)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, phone, address,
                            role, enabled, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'USER', TRUE, NOW(), NOW())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.phone)
    .bind(&req.address)
    .fetch_one(&s.db)
    .await?;

    let token = issue_token(&user, &s.config.jwt_secret, s.config.jwt_expiry_hours)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn login(
    State(s): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&req.email)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !user.enabled || !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let token = issue_token(&user, &s.config.jwt_secret, s.config.jwt_expiry_hours)?;
    tracing::info!(email = %user.email, "user authenticated");
    Ok(Json(AuthResponse { token, user }))
}

async fn me(State(s): State<AppState>, actor: AuthUser) -> Result<Json<User>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(actor.id)
        .fetch_optional(&s.db)
        .await?
        .ok_or_else(|| ApiError::not_found("user", actor.id))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

async fn update_me(
    State(s): State<AppState>,
    actor: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    req.validate()?;
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET first_name = $2, last_name = $3, phone = $4, address = $5,
                          updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(actor.id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.phone)
    .bind(&req.address)
    .fetch_optional(&s.db)
    .await?
    .ok_or_else(|| ApiError::not_found("user", actor.id))?;
    Ok(Json(user))
}
