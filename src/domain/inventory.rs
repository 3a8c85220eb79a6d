//! Inventory ledger: append-only stock movements. Replaying a product's
//! movements in order yields its net stock delta, which auditors can compare
//! against the live `stock` column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Inbound,
    Outbound,
}

impl MovementType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn sign(&self) -> i64 {
        match self {
            Self::Inbound => 1,
            Self::Outbound => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub movement_type: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub fn signed_quantity(&self) -> i64 {
        let sign = MovementType::parse(&self.movement_type)
            .map(|t| t.sign())
            .unwrap_or(0);
        sign * i64::from(self.quantity)
    }
}

/// Net stock delta from replaying a slice of movements. For a product created
/// at stock 0 whose stock was only ever touched through the ledger writers,
/// this equals the current `stock` value.
pub fn net_delta(movements: &[InventoryMovement]) -> i64 {
    movements.iter().map(|m| m.signed_quantity()).sum()
}

/// Direction and magnitude for an absolute stock adjustment. `None` when the
/// target equals the current level, in which case nothing is recorded.
pub fn adjustment(current: i32, target: i32) -> Option<(MovementType, i32)> {
    match target - current {
        0 => None,
        d if d > 0 => Some((MovementType::Inbound, d)),
        d => Some((MovementType::Outbound, -d)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(quantity: i32, movement_type: MovementType) -> InventoryMovement {
        InventoryMovement {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
            movement_type: movement_type.as_str().to_string(),
            reason: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn replay_nets_inbound_against_outbound() {
        let ledger = vec![
            movement(10, MovementType::Inbound),
            movement(3, MovementType::Outbound),
            movement(5, MovementType::Inbound),
            movement(7, MovementType::Outbound),
        ];
        assert_eq!(net_delta(&ledger), 5);
        assert_eq!(net_delta(&[]), 0);
    }

    #[test]
    fn order_then_cancel_nets_to_zero() {
        // a sale followed by its cancellation: sell 3, restore 3
        let ledger = vec![
            movement(3, MovementType::Outbound),
            movement(3, MovementType::Inbound),
        ];
        assert_eq!(net_delta(&ledger), 0);
    }

    #[test]
    fn adjustment_direction() {
        assert_eq!(adjustment(5, 12), Some((MovementType::Inbound, 7)));
        assert_eq!(adjustment(12, 5), Some((MovementType::Outbound, 7)));
        assert_eq!(adjustment(5, 5), None);
    }

    #[test]
    fn unknown_type_contributes_nothing() {
        let mut m = movement(4, MovementType::Inbound);
        m.movement_type = "transfer".into();
        assert_eq!(m.signed_quantity(), 0);
    }
}
