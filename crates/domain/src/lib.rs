//! Storefront domain layer.
//!
//! This crate holds the business rules on top of the `store` traits:
//! - checkout: validation, server-side pricing and atomic order placement
//! - order numbers behind a swappable generator
//! - order lookups scoped to the viewer, and admin order management
//! - catalog browsing and product administration
//! - the category tree
//! - dashboard statistics

pub mod catalog;
pub mod categories;
pub mod checkout;
pub mod dashboard;
pub mod error;
pub mod order_number;
pub mod orders;
mod validation;

pub use catalog::{AdminProductParams, CatalogService, ProductInput, ProductListParams};
pub use categories::{CategoryDetail, CategoryInput, CategoryNode, CategoryService};
pub use checkout::{
    CartLine, CartLineInput, CheckoutRequest, CheckoutService, MAX_ORDER_NUMBER_ATTEMPTS,
    PricedCart, ShippingInput, ValidCheckout, price_cart,
};
pub use dashboard::{DashboardService, DashboardStats};
pub use error::{DomainError, ValidationErrors};
pub use order_number::{OrderNumberGenerator, QueuedOrderNumbers, RandomOrderNumbers};
pub use orders::{AdminOrderFilter, OrderService, is_visible_to};
