//! Order endpoints; the heavy lifting lives in `service::orders`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::{Order, OrderStatus, OrderWithItems};
use crate::error::ApiError;
use crate::routes::{ListParams, PaginatedResponse};
use crate::service::orders::{self, OrderLine};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/my-orders", get(my_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", patch(update_status))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 500, message = "shipping address is required"))]
    pub shipping_address: String,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderLine>,
}

async fn create_order(
    State(s): State<AppState>,
    actor: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ApiError> {
    req.validate()?;
    let order = orders::create_order(
        &s.db,
        actor.id,
        &req.shipping_address,
        req.payment_method.as_deref(),
        &req.items,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ApiError> {
    let order = orders::get_order(&s.db, &actor, id).await?;
    Ok(Json(order))
}

async fn my_orders(
    State(s): State<AppState>,
    actor: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let (limit, offset, page) = params.resolve();
    let (data, total) = orders::list_user_orders(&s.db, actor.id, limit, offset).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

async fn list_orders(
    State(s): State<AppState>,
    actor: AuthUser,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    actor.require_admin()?;
    let status = filter
        .status
        .as_deref()
        .map(|v| {
            OrderStatus::parse(v)
                .ok_or_else(|| ApiError::Validation(format!("unknown order status: {v}")))
        })
        .transpose()?;
    let (limit, offset, page) = ListParams {
        page: filter.page,
        per_page: filter.per_page,
    }
    .resolve();
    let (data, total) = orders::list_orders(&s.db, status, limit, offset).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

async fn cancel_order(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ApiError> {
    let order = orders::cancel_order(&s.db, &actor, id).await?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn update_status(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderWithItems>, ApiError> {
    actor.require_admin()?;
    let status = OrderStatus::parse(&req.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown order status: {}", req.status)))?;
    let order = orders::update_status(&s.db, id, status).await?;
    Ok(Json(order))
}
