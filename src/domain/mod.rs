//! Domain types and rules, kept free of storage concerns.

pub mod inventory;
pub mod order;
pub mod product;
pub mod user;

pub use inventory::{InventoryMovement, MovementType};
pub use order::{Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus};
pub use product::{Product, ProductResponse};
pub use user::{Role, User};
