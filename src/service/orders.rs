//! The order workflow engine: creation, cancellation, and status
//! transitions. Every operation is one transaction; a failure at any step
//! leaves no stock decrement, ledger entry, or order row behind.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::order::{generate_order_number, line_subtotal, order_total};
use crate::domain::{
    MovementType, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus, Product,
};
use crate::error::ApiError;
use crate::service::{catalog, ledger};

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Create an order for `user_id`. Line items are processed in caller order;
/// each one captures the product's current price, decrements stock through
/// the atomic conditional update, and appends an outbound ledger entry. The
/// order row and its items are inserted last and the whole unit commits
/// together.
pub async fn create_order(
    db: &PgPool,
    user_id: Uuid,
    shipping_address: &str,
    payment_method: Option<&str>,
    lines: &[OrderLine],
) -> Result<OrderWithItems, ApiError> {
    if lines.is_empty() {
        return Err(ApiError::Validation("order must contain at least one item".into()));
    }

    let mut tx = db.begin().await?;

    let enabled: Option<bool> = sqlx::query_scalar("SELECT enabled FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    match enabled {
        Some(true) => {}
        Some(false) => return Err(ApiError::Forbidden),
        None => return Err(ApiError::not_found("user", user_id)),
    }

    let order_id = Uuid::new_v4();
    let order_number = generate_order_number();
    let mut items = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity < 1 {
            return Err(ApiError::Validation("quantity must be at least 1".into()));
        }
        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND active")
                .bind(line.product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| ApiError::not_found("product", line.product_id))?;

        catalog::decrement_stock(&mut tx, line.product_id, line.quantity).await?;
        ledger::record_movement(
            &mut tx,
            line.product_id,
            line.quantity,
            MovementType::Outbound,
            &format!("order {order_number}"),
        )
        .await?;

        // price captured now; later catalog price changes never touch this item
        items.push(OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: product.price,
            subtotal: line_subtotal(product.price, line.quantity),
        });
    }

    let total = order_total(&items);
    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, order_number, user_id, status, total_amount,
                             shipping_address, payment_method, payment_status,
                             created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
         RETURNING *",
    )
    .bind(order_id)
    .bind(&order_number)
    .bind(user_id)
    .bind(OrderStatus::Pending.as_str())
    .bind(total)
    .bind(shipping_address)
    .bind(payment_method)
    .bind(PaymentStatus::Pending.as_str())
    .fetch_one(&mut *tx)
    .await?;

    for item in &items {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, subtotal)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.subtotal)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(order_number = %order.order_number, %user_id, total = %total, "order created");
    Ok(OrderWithItems { order, items })
}

/// Cancel an order, restoring every decremented unit and appending matching
/// inbound ledger entries. Owner or admin only; rejected once shipped.
pub async fn cancel_order(
    db: &PgPool,
    actor: &AuthUser,
    order_id: Uuid,
) -> Result<OrderWithItems, ApiError> {
    let mut tx = db.begin().await?;

    let order = lock_order(&mut tx, order_id).await?;
    if order.user_id != actor.id && !actor.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let status = parse_status(&order)?;
    if !status.can_cancel() {
        return Err(ApiError::InvalidTransition {
            from: order.status.clone(),
            to: OrderStatus::Cancelled.as_str().into(),
        });
    }

    restore_stock(&mut tx, &order).await?;
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'CANCELLED', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;
    let items = fetch_items(&mut tx, order_id).await?;

    tx.commit().await?;
    tracing::info!(order_number = %order.order_number, actor = %actor.id, "order cancelled");
    Ok(OrderWithItems { order, items })
}

/// Apply one fulfillment transition. The order row is locked for the whole
/// operation, so transitions on the same order serialize. Re-asserting the
/// current status is a no-op; SHIPPED/DELIVERED stamp their timestamp the
/// first time only; CANCELLED restores stock like `cancel_order`.
pub async fn update_status(
    db: &PgPool,
    order_id: Uuid,
    new_status: OrderStatus,
) -> Result<OrderWithItems, ApiError> {
    let mut tx = db.begin().await?;

    let order = lock_order(&mut tx, order_id).await?;
    let current = parse_status(&order)?;

    if current == new_status {
        let items = fetch_items(&mut tx, order_id).await?;
        tx.commit().await?;
        return Ok(OrderWithItems { order, items });
    }
    if !current.can_transition_to(new_status) {
        return Err(ApiError::InvalidTransition {
            from: order.status.clone(),
            to: new_status.as_str().into(),
        });
    }
    if new_status == OrderStatus::Cancelled {
        restore_stock(&mut tx, &order).await?;
    }

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders
         SET status = $2,
             shipped_at = CASE WHEN $2 = 'SHIPPED'
                               THEN COALESCE(shipped_at, NOW()) ELSE shipped_at END,
             delivered_at = CASE WHEN $2 = 'DELIVERED'
                                 THEN COALESCE(delivered_at, NOW()) ELSE delivered_at END,
             updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(order_id)
    .bind(new_status.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let items = fetch_items(&mut tx, order_id).await?;

    tx.commit().await?;
    tracing::info!(order_number = %order.order_number, status = %order.status, "order status updated");
    Ok(OrderWithItems { order, items })
}

pub async fn get_order(
    db: &PgPool,
    actor: &AuthUser,
    order_id: Uuid,
) -> Result<OrderWithItems, ApiError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("order", order_id))?;
    if order.user_id != actor.id && !actor.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(db)
    .await?;
    Ok(OrderWithItems { order, items })
}

pub async fn list_user_orders(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64), ApiError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok((orders, total))
}

pub async fn list_orders(
    db: &PgPool,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64), ApiError> {
    let (orders, total) = match status {
        Some(status) => {
            let orders = sqlx::query_as::<_, Order>(
                "SELECT * FROM orders WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(db)
                .await?;
            (orders, total)
        }
        None => {
            let orders = sqlx::query_as::<_, Order>(
                "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
                .fetch_one(db)
                .await?;
            (orders, total)
        }
    };
    Ok((orders, total))
}

async fn lock_order(tx: &mut PgConnection, order_id: Uuid) -> Result<Order, ApiError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(tx)
        .await?
        .ok_or_else(|| ApiError::not_found("order", order_id))
}

fn parse_status(order: &Order) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(&order.status).ok_or_else(|| {
        ApiError::Conflict(format!(
            "order {} has unrecognized status {}",
            order.order_number, order.status
        ))
    })
}

async fn fetch_items(tx: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItem>, ApiError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(tx)
    .await?;
    Ok(items)
}

/// Put every decremented unit back and log the restoration. Runs under the
/// caller's transaction and the order-row lock, so it cannot double-apply.
async fn restore_stock(tx: &mut PgConnection, order: &Order) -> Result<(), ApiError> {
    let items = fetch_items(tx, order.id).await?;
    for item in &items {
        catalog::increment_stock(tx, item.product_id, item.quantity).await?;
        ledger::record_movement(
            tx,
            item.product_id,
            item.quantity,
            MovementType::Inbound,
            &format!("cancel order {}", order.order_number),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn seed_user(db: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name,
                                role, enabled, created_at, updated_at)
             VALUES ($1, $2, 'x', 'Test', 'User', 'USER', TRUE, NOW(), NOW())",
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .execute(db)
        .await
        .unwrap();
        id
    }

    async fn seed_product(db: &PgPool, stock: i32, price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO products (id, name, price, stock, min_stock, category,
                                   active, featured, rating, review_count,
                                   created_at, updated_at)
             VALUES ($1, 'Widget', $2, $3, 2, 'tools', TRUE, FALSE, 0, 0, NOW(), NOW())",
        )
        .bind(id)
        .bind(price)
        .bind(stock)
        .execute(db)
        .await
        .unwrap();
        id
    }

    async fn stock_of(db: &PgPool, id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    async fn count(db: &PgPool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(db).await.unwrap()
    }

    fn owner(user_id: Uuid) -> AuthUser {
        AuthUser {
            id: user_id,
            email: "t@example.com".into(),
            role: Role::User,
        }
    }

    #[sqlx::test]
    async fn concurrent_orders_never_oversell(db: PgPool) {
        let user = seed_user(&db).await;
        let product = seed_product(&db, 5, dec!(10.00)).await;

        // four contenders for quantity 2 against stock 5: exactly two can win
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                create_order(
                    &db,
                    user,
                    "1 Test St",
                    None,
                    &[OrderLine { product_id: product, quantity: 2 }],
                )
                .await
            }));
        }

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(created) => {
                    assert_eq!(created.order.total_amount, dec!(20.00));
                    succeeded += 1;
                }
                Err(ApiError::InsufficientStock { product: name }) => assert_eq!(name, "Widget"),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 2);
        assert_eq!(stock_of(&db, product).await, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM orders").await, 2);
        assert_eq!(
            count(&db, "SELECT COUNT(*) FROM inventory_movements WHERE type = 'outbound'").await,
            2
        );
    }

    #[sqlx::test]
    async fn failed_create_leaves_no_partial_effects(db: PgPool) {
        let user = seed_user(&db).await;
        let plentiful = seed_product(&db, 5, dec!(10.00)).await;
        let scarce = seed_product(&db, 1, dec!(4.00)).await;

        // first line would succeed; second fails and must drag it down too
        let err = create_order(
            &db,
            user,
            "1 Test St",
            None,
            &[
                OrderLine { product_id: plentiful, quantity: 2 },
                OrderLine { product_id: scarce, quantity: 5 },
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientStock { .. }));

        assert_eq!(stock_of(&db, plentiful).await, 5);
        assert_eq!(stock_of(&db, scarce).await, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM orders").await, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM order_items").await, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM inventory_movements").await, 0);
    }

    #[sqlx::test]
    async fn order_then_cancel_restores_stock(db: PgPool) {
        let user = seed_user(&db).await;
        let product = seed_product(&db, 5, dec!(10.00)).await; // min_stock 2

        let created = create_order(
            &db,
            user,
            "1 Test St",
            None,
            &[OrderLine { product_id: product, quantity: 3 }],
        )
        .await
        .unwrap();
        assert_eq!(created.order.status, "PENDING");
        assert_eq!(created.order.payment_status, "PENDING");
        assert_eq!(created.order.total_amount, dec!(30.00));
        assert_eq!(stock_of(&db, product).await, 2);
        let row = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(row.is_low_stock());

        let cancelled = cancel_order(&db, &owner(user), created.order.id).await.unwrap();
        assert_eq!(cancelled.order.status, "CANCELLED");
        assert_eq!(stock_of(&db, product).await, 5);
        let inbound: Vec<i32> = sqlx::query_scalar(
            "SELECT quantity FROM inventory_movements WHERE type = 'inbound'",
        )
        .fetch_all(&db)
        .await
        .unwrap();
        assert_eq!(inbound, vec![3]);
    }

    #[sqlx::test]
    async fn cancel_after_shipping_rejected(db: PgPool) {
        let user = seed_user(&db).await;
        let product = seed_product(&db, 5, dec!(10.00)).await;

        let created = create_order(
            &db,
            user,
            "1 Test St",
            None,
            &[OrderLine { product_id: product, quantity: 2 }],
        )
        .await
        .unwrap();
        for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
            update_status(&db, created.order.id, status).await.unwrap();
        }

        let err = cancel_order(&db, &owner(user), created.order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition { .. }));

        let row = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(created.order.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(row.status, "SHIPPED");
        assert!(row.shipped_at.is_some());
        assert_eq!(stock_of(&db, product).await, 3);
    }
}
