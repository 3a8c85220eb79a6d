//! Commerce API
//!
//! E-commerce backend: user registration/authentication, product catalog,
//! order placement with stock reservation, and an append-only inventory
//! ledger, served over REST and backed by Postgres.
//!
//! The order workflow is the core: order creation, cancellation, and status
//! transitions each run as a single transaction, and the stock check is an
//! atomic conditional decrement so concurrent orders can never oversell.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod ml;
pub mod routes;
pub mod service;

pub use config::Config;
pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub ml: ml::MlClient,
}
