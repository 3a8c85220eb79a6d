//! Catalog products. Stock itself is only mutated through the order
//! workflow and inventory adjustments; low-stock is derived on read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    pub category: String,
    pub image_url: Option<String>,
    pub active: bool,
    pub featured: bool,
    pub rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }

    /// Value of the units currently on hand.
    pub fn stock_value(&self) -> Decimal {
        self.price * Decimal::from(self.stock)
    }
}

/// Read shape: the row plus the derived low-stock flag, recomputed on every
/// serialization so it can never drift from stock/min_stock.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    pub low_stock: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let low_stock = product.is_low_stock();
        Self { product, low_stock }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(stock: i32, min_stock: i32, price: Decimal) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Widget".into(),
            description: None,
            price,
            stock,
            min_stock,
            category: "tools".into(),
            image_url: None,
            active: true,
            featured: false,
            rating: Decimal::ZERO,
            review_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn low_stock_boundary() {
        assert!(product(2, 2, dec!(1.00)).is_low_stock());
        assert!(product(0, 0, dec!(1.00)).is_low_stock());
        assert!(!product(3, 2, dec!(1.00)).is_low_stock());
    }

    #[test]
    fn response_carries_derived_flag() {
        let r = ProductResponse::from(product(1, 5, dec!(10.00)));
        assert!(r.low_stock);
        let r = ProductResponse::from(product(6, 5, dec!(10.00)));
        assert!(!r.low_stock);
    }

    #[test]
    fn stock_value() {
        assert_eq!(product(4, 0, dec!(19.99)).stock_value(), dec!(79.96));
    }
}
