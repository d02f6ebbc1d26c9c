use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::{
    BillingAddress, Category, CategoryId, DailyRevenue, Money, NewCategory, NewOrder, NewProduct,
    Order, OrderId, OrderItem, OrderItemId, OrderQuery, OrderStats, OrderStatus, OrderTotals,
    OrderUpdate, Page, PageRequest, Product, ProductChanges, ProductFilter, ProductId,
    ProductStats, ProductStatus, Result, ShippingAddress, StockDecrement, StoreError, UserId,
    store::{CatalogStore, OrderStore},
};

const PRODUCT_COLUMNS: &str = "id, category_id, name, slug, sku, description, price_cents, \
     sale_price_cents, quantity, low_stock_threshold, is_active, is_featured, primary_image_url, \
     created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, payment_method, \
     shipping_first_name, shipping_last_name, shipping_email, shipping_phone, shipping_address, \
     shipping_address_2, shipping_city, shipping_state, shipping_zip, shipping_country, \
     billing_first_name, billing_last_name, billing_address, billing_address_2, billing_city, \
     billing_state, billing_zip, billing_country, subtotal_cents, shipping_cost_cents, tax_cents, \
     discount_cents, total_cents, notes, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, product_sku, product_image, \
     price_cents, quantity, subtotal_cents";

const CATEGORY_COLUMNS: &str = "id, parent_id, name, slug, description, image_url, is_active, \
     sort_order, created_at, updated_at";

const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";
const SKU_CONSTRAINT: &str = "products_sku_key";
const PRODUCT_SLUG_CONSTRAINT: &str = "products_slug_key";
const CATEGORY_SLUG_CONSTRAINT: &str = "categories_slug_key";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            category_id: row.try_get::<Option<i64>, _>("category_id")?.map(Into::into),
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            sku: row.try_get("sku")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            sale_price: row
                .try_get::<Option<i64>, _>("sale_price_cents")?
                .map(Money::from_cents),
            quantity: row.try_get("quantity")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            is_active: row.try_get("is_active")?,
            is_featured: row.try_get("is_featured")?,
            primary_image_url: row.try_get("primary_image_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_category(row: &PgRow) -> Result<Category> {
        Ok(Category {
            id: CategoryId::new(row.try_get("id")?),
            parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(CategoryId::new),
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            image_url: row.try_get("image_url")?,
            is_active: row.try_get("is_active")?,
            sort_order: row.try_get("sort_order")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: OrderItemId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: row.try_get::<Option<i64>, _>("product_id")?.map(Into::into),
            product_name: row.try_get("product_name")?,
            product_sku: row.try_get("product_sku")?,
            product_image: row.try_get("product_image")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity: u32::try_from(quantity).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let billing = BillingAddress {
            first_name: row.try_get("billing_first_name")?,
            last_name: row.try_get("billing_last_name")?,
            address: row.try_get("billing_address")?,
            address_2: row.try_get("billing_address_2")?,
            city: row.try_get("billing_city")?,
            state: row.try_get("billing_state")?,
            zip: row.try_get("billing_zip")?,
            country: row.try_get("billing_country")?,
        };

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            order_number: row.try_get("order_number")?,
            user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            status: status
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            payment_status: payment_status
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            payment_method: row.try_get("payment_method")?,
            shipping: ShippingAddress {
                first_name: row.try_get("shipping_first_name")?,
                last_name: row.try_get("shipping_last_name")?,
                email: row.try_get("shipping_email")?,
                phone: row.try_get("shipping_phone")?,
                address: row.try_get("shipping_address")?,
                address_2: row.try_get("shipping_address_2")?,
                city: row.try_get("shipping_city")?,
                state: row.try_get("shipping_state")?,
                zip: row.try_get("shipping_zip")?,
                country: row.try_get("shipping_country")?,
            },
            billing: (!billing.is_empty()).then_some(billing),
            totals: OrderTotals {
                subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
                shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
                tax: Money::from_cents(row.try_get("tax_cents")?),
                discount: Money::from_cents(row.try_get("discount_cents")?),
                total: Money::from_cents(row.try_get("total_cents")?),
            },
            notes: row.try_get("notes")?,
            items,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    /// Loads the items of many orders in one query, grouped by order.
    async fn load_items(&self, order_ids: &[i64]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let item = Self::row_to_item(row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn rows_to_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                Self::row_to_order(row, items.remove(&OrderId::new(id)).unwrap_or_default())
            })
            .collect()
    }

    async fn fetch_one_order(&self, row: Option<PgRow>) -> Result<Option<Order>> {
        match row {
            Some(row) => Ok(self.rows_to_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

/// Maps a unique violation on `constraint` to `on_conflict`, anything else to a database error.
fn map_unique_violation(
    err: sqlx::Error,
    constraint: &str,
    on_conflict: impl FnOnce() -> StoreError,
) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.constraint() == Some(constraint)
    {
        return on_conflict();
    }
    StoreError::Database(err)
}

/// Maps a unique violation on the SKU or slug of a product to its conflict
/// error.
fn product_conflict(err: sqlx::Error, sku: String, slug: String) -> StoreError {
    let constraint = match &err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_owned),
        _ => None,
    };
    match constraint.as_deref() {
        Some(SKU_CONSTRAINT) => StoreError::DuplicateSku(sku),
        Some(PRODUCT_SLUG_CONSTRAINT) => StoreError::DuplicateSlug(slug),
        _ => StoreError::Database(err),
    }
}

/// Escapes LIKE wildcards and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_product_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    builder.push(" WHERE 1=1");
    if filter.active_only {
        builder.push(" AND is_active");
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND category_id = ").push_bind(category_id.get());
    }
    if let Some(featured) = filter.featured {
        builder.push(" AND is_featured = ").push_bind(featured);
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR sku ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = filter.min_price {
        builder.push(" AND price_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = filter.max_price {
        builder.push(" AND price_cents <= ").push_bind(max.cents());
    }
    if filter.in_stock {
        builder.push(" AND quantity > 0");
    }
    match filter.status {
        Some(ProductStatus::Active) => {
            builder.push(" AND is_active");
        }
        Some(ProductStatus::Inactive) => {
            builder.push(" AND NOT is_active");
        }
        Some(ProductStatus::LowStock) => {
            builder.push(" AND quantity > 0 AND quantity <= low_stock_threshold");
        }
        Some(ProductStatus::OutOfStock) => {
            builder.push(" AND quantity <= 0");
        }
        None => {}
    }
}

fn push_order_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    builder.push(" WHERE 1=1");
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.get());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = query.payment_status {
        builder
            .push(" AND payment_status = ")
            .push_bind(payment_status.as_str());
    }
    if let Some(from) = query.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(term) = &query.search {
        let pattern = like_pattern(term);
        builder.push(" AND (order_number ILIKE ").push_bind(pattern.clone());
        builder.push(" OR shipping_email ILIKE ").push_bind(pattern.clone());
        builder.push(" OR shipping_first_name ILIKE ").push_bind(pattern.clone());
        builder.push(" OR shipping_last_name ILIKE ").push_bind(pattern);
        builder.push(")");
    }
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    builder
        .push(" LIMIT ")
        .push_bind(page.limit() as i64)
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let raw: Vec<i64> = ids.iter().map(ProductId::get).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let direction = filter.direction.keyword();
        let mut select = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut select, filter);
        select.push(format!(
            " ORDER BY {} {direction}, id {direction}",
            filter.sort_by.column()
        ));
        push_page(&mut select, page);
        let rows = select.build().fetch_all(&self.pool).await?;

        let products = rows
            .iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(products, page, total as u64))
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let (sku, slug) = (product.sku.clone(), product.slug.clone());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (category_id, name, slug, sku, description, price_cents,
                sale_price_cents, quantity, low_stock_threshold, is_active, is_featured,
                primary_image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.category_id.map(|c| c.get()))
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|m| m.cents()))
        .bind(product.quantity)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(&product.primary_image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| product_conflict(e, sku, slug))?;

        Self::row_to_product(&row)
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut product = Self::row_to_product(&row)?;
        changes.apply_to(&mut product);

        let (sku, slug) = (product.sku.clone(), product.slug.clone());
        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET category_id = $2, name = $3, slug = $4, sku = $5,
                description = $6, price_cents = $7, sale_price_cents = $8, quantity = $9,
                low_stock_threshold = $10, is_active = $11, is_featured = $12,
                primary_image_url = $13, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(product.category_id.map(|c| c.get()))
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|m| m.cents()))
        .bind(product.quantity)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(&product.primary_image_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| product_conflict(e, sku, slug))?;

        let updated = Self::row_to_product(&row)?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn product_stats(&self) -> Result<ProductStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_active) AS active,
                COUNT(*) FILTER (
                    WHERE quantity > 0 AND quantity <= low_stock_threshold
                ) AS low_stock,
                COUNT(*) FILTER (WHERE quantity <= 0) AS out_of_stock
            FROM products
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ProductStats {
            total: row.try_get::<i64, _>("total")? as u64,
            active: row.try_get::<i64, _>("active")? as u64,
            low_stock: row.try_get::<i64, _>("low_stock")? as u64,
            out_of_stock: row.try_get::<i64, _>("out_of_stock")? as u64,
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_category).collect()
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_category).transpose()
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_category).transpose()
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category> {
        let slug = category.slug.clone();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO categories (parent_id, name, slug, description, image_url, is_active,
                sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(category.parent_id.map(|c| c.get()))
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.image_url)
        .bind(category.is_active)
        .bind(category.sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, CATEGORY_SLUG_CONSTRAINT, || StoreError::DuplicateSlug(slug))
        })?;

        Self::row_to_category(&row)
    }

    async fn count_products_by_category(&self) -> Result<HashMap<CategoryId, u64>> {
        let rows = sqlx::query(
            r#"
            SELECT category_id, COUNT(*) AS products
            FROM products
            WHERE category_id IS NOT NULL
            GROUP BY category_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    CategoryId::new(row.try_get("category_id")?),
                    row.try_get::<i64, _>("products")? as u64,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, order: NewOrder, decrements: &[StockDecrement]) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Lock product rows in id order so concurrent checkouts can't deadlock
        let mut sorted = decrements.to_vec();
        sorted.sort_by_key(|d| d.product_id);

        for decrement in &sorted {
            let insufficient = || StoreError::InsufficientStock {
                product_id: decrement.product_id,
                requested: decrement.quantity,
            };
            let quantity = i32::try_from(decrement.quantity).map_err(|_| insufficient())?;

            // The UPDATE takes the row lock; the guard is re-evaluated after
            // any concurrent writer commits, so stock can't go negative.
            let result = sqlx::query(
                r#"
                UPDATE products
                SET quantity = quantity - $2, updated_at = NOW()
                WHERE id = $1 AND is_active AND quantity >= $2
                "#,
            )
            .bind(decrement.product_id.get())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(
                    product_id = %decrement.product_id,
                    "stock guard rejected decrement"
                );
                return Err(insufficient());
            }
        }

        let billing = order.billing.clone().unwrap_or_default();
        let order_number = order.order_number.clone();
        let row = sqlx::query(
            r#"
            INSERT INTO orders (order_number, user_id, status, payment_status, payment_method,
                shipping_first_name, shipping_last_name, shipping_email, shipping_phone,
                shipping_address, shipping_address_2, shipping_city, shipping_state, shipping_zip,
                shipping_country, billing_first_name, billing_last_name, billing_address,
                billing_address_2, billing_city, billing_state, billing_zip, billing_country,
                subtotal_cents, shipping_cost_cents, tax_cents, discount_cents, total_cents, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&order.order_number)
        .bind(order.user_id.map(|u| u.get()))
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_method)
        .bind(&order.shipping.first_name)
        .bind(&order.shipping.last_name)
        .bind(&order.shipping.email)
        .bind(&order.shipping.phone)
        .bind(&order.shipping.address)
        .bind(&order.shipping.address_2)
        .bind(&order.shipping.city)
        .bind(&order.shipping.state)
        .bind(&order.shipping.zip)
        .bind(&order.shipping.country)
        .bind(&billing.first_name)
        .bind(&billing.last_name)
        .bind(&billing.address)
        .bind(&billing.address_2)
        .bind(&billing.city)
        .bind(&billing.state)
        .bind(&billing.zip)
        .bind(&billing.country)
        .bind(order.totals.subtotal.cents())
        .bind(order.totals.shipping_cost.cents())
        .bind(order.totals.tax.cents())
        .bind(order.totals.discount.cents())
        .bind(order.totals.total.cents())
        .bind(&order.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, ORDER_NUMBER_CONSTRAINT, || {
                StoreError::DuplicateOrderNumber(order_number)
            })
        })?;

        let order_id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                }
            })?;
            let item_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, product_sku,
                    product_image, price_cents, quantity, subtotal_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id
                "#,
            )
            .bind(order_id.get())
            .bind(item.product_id.get())
            .bind(&item.product_name)
            .bind(&item.product_sku)
            .bind(&item.product_image)
            .bind(item.price.cents())
            .bind(quantity)
            .bind(item.subtotal.cents())
            .fetch_one(&mut *tx)
            .await?;

            items.push(item.into_item(OrderItemId::new(item_id), order_id));
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            shipping: order.shipping,
            billing: order.billing,
            totals: order.totals,
            notes: order.notes,
            items,
            created_at,
            updated_at,
        })
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        self.fetch_one_order(row).await
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;
        self.fetch_one_order(row).await
    }

    async fn list_orders_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        self.query_orders(&OrderQuery::for_user(user_id), page).await
    }

    async fn query_orders(&self, query: &OrderQuery, page: PageRequest) -> Result<Page<Order>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let direction = query.direction.keyword();
        let mut select = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filters(&mut select, query);
        select.push(format!(
            " ORDER BY {} {direction}, id {direction}",
            query.sort_by.column()
        ));
        push_page(&mut select, page);
        let rows = select.build().fetch_all(&self.pool).await?;

        let orders = self.rows_to_orders(rows).await?;
        Ok(Page::new(orders, page, total as u64))
    }

    async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = COALESCE($2, status),
                payment_status = COALESCE($3, payment_status),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.payment_status.map(|s| s.as_str()))
        .bind(&update.notes)
        .fetch_optional(&self.pool)
        .await?;
        self.fetch_one_order(row).await
    }

    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;
        self.fetch_one_order(row).await
    }

    async fn order_stats(&self) -> Result<OrderStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                COALESCE(
                    SUM(total_cents) FILTER (WHERE payment_status = 'paid'), 0
                )::BIGINT AS revenue
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderStats {
            total: row.try_get::<i64, _>("total")? as u64,
            pending: row.try_get::<i64, _>("pending")? as u64,
            processing: row.try_get::<i64, _>("processing")? as u64,
            delivered: row.try_get::<i64, _>("delivered")? as u64,
            revenue: Money::from_cents(row.try_get("revenue")?),
        })
    }

    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyRevenue>> {
        let rows = sqlx::query(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                SUM(total_cents)::BIGINT AS revenue
            FROM orders
            WHERE payment_status = 'paid' AND created_at >= $1
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyRevenue {
                    date: row.try_get("day")?,
                    revenue: Money::from_cents(row.try_get("revenue")?),
                })
            })
            .collect()
    }
}
