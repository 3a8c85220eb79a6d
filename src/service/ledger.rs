//! Inventory ledger writes and reads. Movements are append-only; stock
//! history is reconstructed by replaying them (see `domain::inventory`).

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::inventory::{adjustment, InventoryMovement, MovementType};
use crate::domain::Product;
use crate::error::ApiError;

/// Pure insert; no business logic beyond the append.
pub async fn record_movement(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
    movement_type: MovementType,
    reason: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO inventory_movements (id, product_id, quantity, type, reason, created_at)
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(quantity)
    .bind(movement_type.as_str())
    .bind(reason)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Set a product's stock to an absolute level, recording the delta as a
/// movement. The row is locked so a concurrent order cannot slip between the
/// read and the write. A no-change adjustment records nothing.
pub async fn adjust_stock(
    db: &PgPool,
    product_id: Uuid,
    target: i32,
    reason: &str,
) -> Result<Product, ApiError> {
    if target < 0 {
        return Err(ApiError::Validation("stock cannot be negative".into()));
    }
    let mut tx = db.begin().await?;

    let current: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("product", product_id))?;

    if let Some((movement_type, delta)) = adjustment(current, target) {
        record_movement(&mut tx, product_id, delta, movement_type, reason).await?;
        sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        tracing::info!(%product_id, from = current, to = target, reason, "stock adjusted");
    }

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(product)
}

/// Movement history for one product, newest first.
pub async fn product_history(
    db: &PgPool,
    product_id: Uuid,
) -> Result<Vec<InventoryMovement>, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
        .bind(product_id)
        .fetch_one(db)
        .await?;
    if !exists {
        return Err(ApiError::not_found("product", product_id));
    }
    let movements = sqlx::query_as::<_, InventoryMovement>(
        "SELECT * FROM inventory_movements WHERE product_id = $1 ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;
    Ok(movements)
}

pub async fn list_movements(
    db: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<InventoryMovement>, i64), ApiError> {
    let movements = sqlx::query_as::<_, InventoryMovement>(
        "SELECT * FROM inventory_movements ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_movements")
        .fetch_one(db)
        .await?;
    Ok((movements, total))
}

#[derive(Debug, Serialize)]
pub struct InventoryAnalytics {
    pub total_products: i64,
    pub low_stock_products: i64,
    pub out_of_stock_products: i64,
    pub total_inventory_value: Decimal,
}

pub async fn analytics(db: &PgPool) -> Result<InventoryAnalytics, ApiError> {
    let row: (i64, i64, i64, Option<Decimal>) = sqlx::query_as(
        "SELECT COUNT(*),
                COUNT(*) FILTER (WHERE stock <= min_stock),
                COUNT(*) FILTER (WHERE stock = 0),
                SUM(price * stock)
         FROM products WHERE active",
    )
    .fetch_one(db)
    .await?;
    Ok(InventoryAnalytics {
        total_products: row.0,
        low_stock_products: row.1,
        out_of_stock_products: row.2,
        total_inventory_value: row.3.unwrap_or(Decimal::ZERO),
    })
}
