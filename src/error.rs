//! One error taxonomy for the whole API. Every rejection carries the rule
//! violated and the entity involved; storage failures are logged and hidden
//! behind a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("insufficient stock for product: {product}")]
    InsufficientStock { product: String },

    #[error("access denied")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(sqlx::Error),
}

/// Unique violations lose the race that an application-level existence check
/// already screened for (duplicate email, order-number collision); they are
/// client-visible conflicts, not storage failures.
impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                let constraint = db.constraint().unwrap_or("unique value");
                return Self::Conflict(format!("duplicate value for {constraint}"));
            }
        }
        Self::Storage(e)
    }
}

impl ApiError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Storage(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                "storage unavailable".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::not_found("product", "p1").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InsufficientStock { product: "Widget".into() }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::InvalidTransition { from: "SHIPPED".into(), to: "CANCELLED".into() }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Storage(sqlx::Error::PoolTimedOut).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[sqlx::test]
    async fn duplicate_key_maps_to_conflict(db: sqlx::PgPool) {
        let insert = "INSERT INTO users (id, email, password_hash, first_name, last_name,
                                         role, enabled, created_at, updated_at)
                      VALUES ($1, 'dup@example.com', 'x', 'A', 'B', 'USER', TRUE, NOW(), NOW())";
        sqlx::query(insert)
            .bind(uuid::Uuid::new_v4())
            .execute(&db)
            .await
            .unwrap();
        let err = sqlx::query(insert)
            .bind(uuid::Uuid::new_v4())
            .execute(&db)
            .await
            .unwrap_err();

        let api = ApiError::from(err);
        assert!(matches!(api, ApiError::Conflict(_)));
        assert_eq!(api.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn messages_name_the_entity() {
        let e = ApiError::InsufficientStock { product: "Widget".into() };
        assert_eq!(e.to_string(), "insufficient stock for product: Widget");
        let e = ApiError::not_found("order", "42");
        assert_eq!(e.to_string(), "order not found: 42");
    }
}
