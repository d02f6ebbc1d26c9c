//! Shared types for the storefront: row identifiers, fixed-point money and
//! pagination.

pub mod ids;
pub mod money;
pub mod page;

pub use ids::{CategoryId, OrderId, OrderItemId, ProductId, UserId};
pub use money::Money;
pub use page::{Page, PageRequest};
