//! Catalog management. Mutations are admin-only; stock writes go through
//! the inventory ledger so every change leaves an audit trail.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::QueryBuilder;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::{Product, ProductResponse};
use crate::error::ApiError;
use crate::ml::PredictionResponse;
use crate::routes::{ListParams, PaginatedResponse};
use crate::service::ledger;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/featured", get(featured_products))
        .route("/categories", get(categories))
        .route("/low-stock", get(low_stock_products))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/:id/stock", axum::routing::patch(set_stock))
        .route("/:id/prediction", get(prediction))
}

#[derive(Debug, Deserialize)]
pub struct ProductFilter {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

async fn list_products(
    State(s): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<PaginatedResponse<ProductResponse>>, ApiError> {
    let (limit, offset, page) = ListParams {
        page: filter.page,
        per_page: filter.per_page,
    }
    .resolve();

    let mut query: QueryBuilder<sqlx::Postgres> =
        QueryBuilder::new("SELECT * FROM products WHERE active");
    let mut count: QueryBuilder<sqlx::Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM products WHERE active");
    for builder in [&mut query, &mut count] {
        if let Some(q) = &filter.q {
            builder.push(" AND name ILIKE ").push_bind(format!("%{q}%"));
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND price >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND price <= ").push_bind(max);
        }
    }
    query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let products: Vec<Product> = query.build_query_as().fetch_all(&s.db).await?;
    let total: i64 = count.build_query_scalar().fetch_one(&s.db).await?;
    Ok(Json(PaginatedResponse {
        data: products.into_iter().map(ProductResponse::from).collect(),
        total,
        page,
    }))
}

async fn get_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or_else(|| ApiError::not_found("product", id))?;
    Ok(Json(product.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(range(min = 0, message = "min_stock cannot be negative"))]
    pub min_stock: Option<i32>,
    #[validate(length(min = 1, max = 50, message = "category must be 1-50 characters"))]
    pub category: String,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}

impl ProductRequest {
    fn check(&self) -> Result<(), ApiError> {
        self.validate()?;
        if self.price <= Decimal::ZERO {
            return Err(ApiError::Validation("price must be greater than zero".into()));
        }
        Ok(())
    }
}

async fn create_product(
    State(s): State<AppState>,
    actor: AuthUser,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    actor.require_admin()?;
    req.check()?;
    tracing::info!(name = %req.name, "creating product");

    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, name, description, price, stock, min_stock, category,
                               image_url, active, featured, rating, review_count,
                               created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, 0, 0, NOW(), NOW())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock.unwrap_or(0))
    .bind(req.min_stock.unwrap_or(0))
    .bind(&req.category)
    .bind(&req.image_url)
    .bind(req.featured.unwrap_or(false))
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "min_stock cannot be negative"))]
    pub min_stock: Option<i32>,
    #[validate(length(min = 1, max = 50, message = "category must be 1-50 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}

impl UpdateProductRequest {
    fn check(&self) -> Result<(), ApiError> {
        self.validate()?;
        if matches!(self.price, Some(p) if p <= Decimal::ZERO) {
            return Err(ApiError::Validation("price must be greater than zero".into()));
        }
        Ok(())
    }
}

async fn update_product(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    actor.require_admin()?;
    req.check()?;

    // omitted fields keep their value; stock is deliberately absent here, it
    // only moves through orders and the inventory adjustment endpoint
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products
         SET name = COALESCE($2, name),
             description = COALESCE($3, description),
             price = COALESCE($4, price),
             min_stock = COALESCE($5, min_stock),
             category = COALESCE($6, category),
             image_url = COALESCE($7, image_url),
             featured = COALESCE($8, featured),
             updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.min_stock)
    .bind(&req.category)
    .bind(&req.image_url)
    .bind(req.featured)
    .fetch_optional(&s.db)
    .await?
    .ok_or_else(|| ApiError::not_found("product", id))?;
    Ok(Json(product.into()))
}

async fn delete_product(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    actor.require_admin()?;

    // soft delete; historical orders keep referencing the row
    let result = sqlx::query("UPDATE products SET active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("product", id));
    }
    tracing::info!(%id, "product delisted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: i32,
    pub reason: Option<String>,
}

async fn set_stock(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    actor.require_admin()?;
    let reason = req.reason.as_deref().unwrap_or("stock adjustment");
    let product = ledger::adjust_stock(&s.db, id, req.stock, reason).await?;
    Ok(Json(product.into()))
}

async fn featured_products(
    State(s): State<AppState>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE active AND featured ORDER BY rating DESC",
    )
    .fetch_all(&s.db)
    .await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

async fn categories(State(s): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let categories: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT category FROM products WHERE active ORDER BY category")
            .fetch_all(&s.db)
            .await?;
    Ok(Json(categories))
}

async fn low_stock_products(
    State(s): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    actor.require_admin()?;
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE active AND stock <= min_stock ORDER BY stock",
    )
    .fetch_all(&s.db)
    .await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct PredictionParams {
    pub days: Option<i32>,
}

async fn prediction(
    State(s): State<AppState>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<PredictionParams>,
) -> Result<Json<PredictionResponse>, ApiError> {
    actor.require_admin()?;
    let response = s.ml.predict_demand(&s.db, id, params.days.unwrap_or(30)).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::ml::MlClient;
    use crate::Config;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn state(db: sqlx::PgPool) -> AppState {
        AppState {
            db,
            config: Arc::new(Config {
                database_url: String::new(),
                port: 0,
                jwt_secret: "test".into(),
                jwt_expiry_hours: 1,
                ml_service_url: None,
            }),
            ml: MlClient::new(None),
        }
    }

    fn admin() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "admin@example.com".into(),
            role: Role::Admin,
        }
    }

    fn empty_update() -> UpdateProductRequest {
        UpdateProductRequest {
            name: None,
            description: None,
            price: None,
            min_stock: None,
            category: None,
            image_url: None,
            featured: None,
        }
    }

    #[test]
    fn update_rejects_non_positive_price() {
        let mut req = empty_update();
        req.price = Some(Decimal::ZERO);
        assert!(req.check().is_err());
        req.price = Some(dec!(0.01));
        assert!(req.check().is_ok());
    }

    #[sqlx::test]
    async fn partial_update_preserves_omitted_fields(db: sqlx::PgPool) {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO products (id, name, price, stock, min_stock, category,
                                   active, featured, rating, review_count,
                                   created_at, updated_at)
             VALUES ($1, 'Widget', $2, 7, 3, 'tools', TRUE, FALSE, 0, 0, NOW(), NOW())",
        )
        .bind(id)
        .bind(dec!(10.00))
        .execute(&db)
        .await
        .unwrap();

        let mut req = empty_update();
        req.name = Some("Gadget".into());
        let Json(updated) = update_product(State(state(db)), admin(), Path(id), Json(req))
            .await
            .unwrap();

        assert_eq!(updated.product.name, "Gadget");
        assert_eq!(updated.product.min_stock, 3);
        assert_eq!(updated.product.price, dec!(10.00));
        assert_eq!(updated.product.stock, 7);
        assert_eq!(updated.product.category, "tools");
    }
}
