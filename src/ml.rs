//! Prediction gateway: demand forecasts from an external ML service, with a
//! conservative local fallback when it is unreachable. Calls here never run
//! inside a stock-mutating transaction; stock readings may be slightly stale.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::Product;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct MlClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionRequest {
    pub product_id: Uuid,
    pub product_name: String,
    pub category: String,
    pub current_stock: i32,
    pub average_sales: f64,
    pub days_to_predict: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub product_id: Uuid,
    pub predicted_demand: i32,
    pub recommended_stock: i32,
    pub confidence: f64,
    pub risk_level: String,
    pub recommendations: String,
}

impl MlClient {
    pub fn new(base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    /// Forecast demand for one product over `days`. Average daily sales are
    /// computed from the trailing 30 days of non-cancelled orders. Any
    /// transport or remote failure degrades to the static fallback.
    pub async fn predict_demand(
        &self,
        db: &PgPool,
        product_id: Uuid,
        days: i32,
    ) -> Result<PredictionResponse, ApiError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::not_found("product", product_id))?;

        let sold: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(oi.quantity)
             FROM order_items oi
             JOIN orders o ON o.id = oi.order_id
             WHERE oi.product_id = $1
               AND o.status <> 'CANCELLED'
               AND o.created_at >= NOW() - INTERVAL '30 days'",
        )
        .bind(product_id)
        .fetch_one(db)
        .await?;
        let average_sales = sold.unwrap_or(0) as f64 / 30.0;

        let request = PredictionRequest {
            product_id,
            product_name: product.name.clone(),
            category: product.category.clone(),
            current_stock: product.stock,
            average_sales,
            days_to_predict: days.max(1),
        };

        match self.call_remote(&request).await {
            Some(response) => Ok(response),
            None => {
                tracing::warn!(%product_id, "prediction service unavailable, using fallback");
                Ok(fallback(&product))
            }
        }
    }

    async fn call_remote(&self, request: &PredictionRequest) -> Option<PredictionResponse> {
        let base = self.base_url.as_ref()?;
        let response = self
            .http
            .post(format!("{base}/predict/stock"))
            .json(request)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        response.json().await.ok()
    }
}

/// Static contract when no forecast is available: assume half the current
/// stock will move and recommend holding the line.
pub fn fallback(product: &Product) -> PredictionResponse {
    PredictionResponse {
        product_id: product.id,
        predicted_demand: product.stock / 2,
        recommended_stock: product.stock,
        confidence: 0.3,
        risk_level: "UNKNOWN".into(),
        recommendations: "Prediction unavailable; maintain current stock.".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn product(stock: i32) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Widget".into(),
            description: None,
            price: Decimal::ONE,
            stock,
            min_stock: 0,
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
    fn fallback_is_conservative() {
        let p = product(10);
        let f = fallback(&p);
        assert_eq!(f.product_id, p.id);
        assert_eq!(f.predicted_demand, 5);
        assert_eq!(f.recommended_stock, 10);
        assert_eq!(f.risk_level, "UNKNOWN");
        assert!(f.confidence < 0.5);
    }

    #[test]
    fn fallback_handles_empty_stock() {
        let f = fallback(&product(0));
        assert_eq!(f.predicted_demand, 0);
        assert_eq!(f.recommended_stock, 0);
    }
}
