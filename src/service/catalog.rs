//! Stock mutation contract consumed by the order workflow. Both mutations
//! run against the caller's transaction so they commit or roll back with it.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::ApiError;

/// Atomic check-and-decrement: the stock comparison happens inside the
/// UPDATE itself, so two concurrent orders for the same product serialize on
/// the row and the loser sees the decremented value. Zero rows affected means
/// the product is missing, delisted, or short on stock.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $2, updated_at = NOW()
         WHERE id = $1 AND active AND stock >= $2",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let name: Option<String> =
        sqlx::query_scalar("SELECT name FROM products WHERE id = $1 AND active")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;
    match name {
        Some(product) => Err(ApiError::InsufficientStock { product }),
        None => Err(ApiError::not_found("product", product_id)),
    }
}

/// Stock restoration. Applies to delisted products too, so cancelling an
/// order keeps the ledger honest even after a soft delete.
pub async fn increment_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(ApiError::not_found("product", product_id))
    }
}
