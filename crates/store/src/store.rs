use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Category, CategoryId, DailyRevenue, NewCategory, NewOrder, NewProduct, Order, OrderId,
    OrderQuery, OrderStats, OrderStatus, OrderUpdate, Page, PageRequest, Product, ProductChanges,
    ProductFilter, ProductId, ProductStats, Result, StockDecrement, UserId,
};

/// Read and admin-write access to catalog products.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Looks up many products in one read. Unknown ids are simply absent
    /// from the returned map.
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    /// Lists products matching `filter`, in the filter's sort order with
    /// ties broken by id.
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest)
    -> Result<Page<Product>>;

    /// Inserts a product. Fails with `DuplicateSku` or `DuplicateSlug` if
    /// either is taken.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Applies `changes` and bumps `updated_at`. Returns None if the product
    /// doesn't exist.
    async fn update_product(&self, id: ProductId, changes: ProductChanges)
    -> Result<Option<Product>>;

    /// Deletes a product. Order items referencing it keep their snapshot and
    /// lose the reference. Returns false if nothing was deleted.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    async fn product_stats(&self) -> Result<ProductStats>;

    /// Every category, ordered by `sort_order` then id.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// Inserts a category. Fails with `DuplicateSlug` if the slug is taken.
    async fn insert_category(&self, category: NewCategory) -> Result<Category>;

    /// Number of products (active or not) per category. Categories without
    /// products are absent.
    async fn count_products_by_category(&self) -> Result<HashMap<CategoryId, u64>>;
}

/// Persistence for orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes an order with its items and applies `decrements` to product
    /// stock, atomically - either everything is written or nothing is.
    ///
    /// Each decrement is guarded: if the product is inactive, missing, or
    /// holds less than the requested quantity at write time, the whole
    /// operation fails with `InsufficientStock`. A taken order number fails
    /// with `DuplicateOrderNumber`.
    async fn create_order(&self, order: NewOrder, decrements: &[StockDecrement]) -> Result<Order>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>>;

    /// Orders owned by `user_id`, newest first.
    async fn list_orders_for_user(&self, user_id: UserId, page: PageRequest)
    -> Result<Page<Order>>;

    async fn query_orders(&self, query: &OrderQuery, page: PageRequest) -> Result<Page<Order>>;

    /// Applies `update` and bumps `updated_at`. Returns None if the order
    /// doesn't exist.
    async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>>;

    /// Moves the order to `next` only if its status is still `expected`,
    /// checked and written atomically. Returns None if the order doesn't
    /// exist or its status has changed.
    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>>;

    async fn order_stats(&self) -> Result<OrderStats>;

    /// Paid revenue per UTC day for orders created at or after `since`,
    /// oldest day first. Days without paid orders are absent.
    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyRevenue>>;
}

/// Everything the storefront services need from one backend.
pub trait StorefrontStore: CatalogStore + OrderStore + Clone + 'static {}

impl<T: CatalogStore + OrderStore + Clone + 'static> StorefrontStore for T {}
