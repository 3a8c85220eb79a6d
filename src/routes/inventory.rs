//! Inventory ledger endpoints, all admin-only.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::InventoryMovement;
use crate::domain::ProductResponse;
use crate::error::ApiError;
use crate::routes::{ListParams, PaginatedResponse};
use crate::service::ledger::{self, InventoryAnalytics};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/movements", get(list_movements))
        .route("/products/:id/history", get(product_history))
        .route("/adjust", post(adjust))
        .route("/analytics", get(analytics))
}

async fn list_movements(
    State(s): State<AppState>,
    actor: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<InventoryMovement>>, ApiError> {
    actor.require_admin()?;
    let (limit, offset, page) = params.resolve();
    let (data, total) = ledger::list_movements(&s.db, limit, offset).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

async fn product_history(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<InventoryMovement>>, ApiError> {
    actor.require_admin()?;
    let movements = ledger::product_history(&s.db, id).await?;
    Ok(Json(movements))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub product_id: Uuid,
    pub stock: i32,
    pub reason: Option<String>,
}

async fn adjust(
    State(s): State<AppState>,
    actor: AuthUser,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    actor.require_admin()?;
    let reason = req.reason.as_deref().unwrap_or("inventory adjustment");
    let product = ledger::adjust_stock(&s.db, req.product_id, req.stock, reason).await?;
    Ok(Json(product.into()))
}

async fn analytics(
    State(s): State<AppState>,
    actor: AuthUser,
) -> Result<Json<InventoryAnalytics>, ApiError> {
    actor.require_admin()?;
    let analytics = ledger::analytics(&s.db).await?;
    Ok(Json(analytics))
}
