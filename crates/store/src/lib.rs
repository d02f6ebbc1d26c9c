//! Catalog and order persistence for the storefront.
//!
//! Two backends implement the same [`CatalogStore`] and [`OrderStore`]
//! traits: [`InMemoryStore`] for tests and local runs, and
//! [`PostgresStore`] for production.

pub mod category;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod product;
pub mod query;
pub mod store;

pub use common::{CategoryId, Money, OrderId, OrderItemId, Page, PageRequest, ProductId, UserId};
pub use category::{Category, NewCategory};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use order::{
    BillingAddress, DailyRevenue, NewOrder, NewOrderItem, Order, OrderItem, OrderStats,
    OrderStatus, OrderTotals, OrderUpdate, ParseStatusError, PaymentStatus, ShippingAddress,
    StockDecrement,
};
pub use postgres::PostgresStore;
pub use product::{
    NewProduct, Product, ProductChanges, ProductFilter, ProductSortField, ProductStats,
    ProductStatus,
};
pub use query::{OrderQuery, OrderSortField, SortDirection};
pub use store::{CatalogStore, OrderStore, StorefrontStore};
