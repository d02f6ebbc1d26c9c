//! Route handlers and the state they share.

pub mod admin;
pub mod categories;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;

use domain::{CatalogService, CategoryService, CheckoutService, DashboardService, OrderService};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub categories: CategoryService<S>,
    pub dashboard: DashboardService<S>,
}

/// Parses a numeric path segment.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}
