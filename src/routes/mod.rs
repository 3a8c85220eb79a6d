//! Route table and shared pagination envelope.

use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

pub mod auth;
pub mod inventory;
pub mod orders;
pub mod products;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    /// (limit, offset, page), clamped to page ≥ 1 and per_page ≤ 100.
    /// Widened before multiplying so an absurd page number cannot overflow.
    pub fn resolve(&self) -> (i64, i64, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (i64::from(page) - 1) * i64::from(per_page);
        (i64::from(per_page), offset, page)
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "commerce-api"})) }),
        )
        .nest("/api/v1/auth", auth::router())
        .nest("/api/v1/products", products::router())
        .nest("/api/v1/orders", orders::router())
        .nest("/api/v1/inventory", inventory::router())
}
