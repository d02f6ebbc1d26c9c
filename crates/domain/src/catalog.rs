//! Catalog browsing and product administration.

use serde::{Deserialize, Deserializer};
use store::{
    CatalogStore, CategoryId, Money, NewProduct, Page, PageRequest, Product, ProductChanges,
    ProductFilter, ProductId, ProductSortField, ProductStatus, product::slugify,
};

use crate::error::{DomainError, ValidationErrors};
use crate::orders::{non_blank, parse_direction};
use crate::validation::{optional, required};

/// Default page size of the storefront product listing.
pub const PRODUCTS_PER_PAGE: u32 = 12;

/// Largest page a shopper may ask for.
pub const PUBLIC_MAX_PER_PAGE: u32 = 48;

/// Default page size of the admin product listing.
pub const ADMIN_PRODUCTS_PER_PAGE: u32 = 15;

/// How many products the featured shelf shows.
pub const FEATURED_LIMIT: u32 = 8;

const NAME_MAX: usize = 255;
const SKU_MAX: usize = 100;
/// Largest price a product may carry: 99,999,999.99.
pub const PRICE_MAX: Money = Money::from_cents(9_999_999_999);

/// Distinguishes an absent field from an explicit `null`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Product fields as submitted by an admin. On update, absent fields are
/// left unchanged and `null` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductInput {
    pub name: Option<String>,
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<i64>>,
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub sale_price: Option<Option<f64>>,
    pub quantity: Option<i64>,
    pub low_stock_threshold: Option<i64>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub primary_image_url: Option<Option<String>>,
}

fn money(errors: &mut ValidationErrors, field: &str, value: f64) -> Option<Money> {
    match Money::from_decimal(value) {
        Some(m) if m > PRICE_MAX => {
            errors.add(
                field,
                format!("The {field} field must not be greater than 99999999.99."),
            );
            None
        }
        Some(m) if !m.is_negative() => Some(m),
        _ => {
            errors.add(field, format!("The {field} field must be at least 0."));
            None
        }
    }
}

fn count(errors: &mut ValidationErrors, field: &str, value: i64) -> Option<i32> {
    match i32::try_from(value) {
        Ok(v) if v >= 0 => Some(v),
        _ => {
            errors.add(field, format!("The {field} field must be at least 0."));
            None
        }
    }
}

impl ProductInput {
    /// Validates a full product for insertion.
    pub fn into_new_product(self) -> Result<NewProduct, DomainError> {
        let mut errors = ValidationErrors::new();

        let name = required(&mut errors, "name", self.name.as_deref(), NAME_MAX);
        let sku = required(&mut errors, "sku", self.sku.as_deref(), SKU_MAX);
        let price = match self.price {
            Some(p) => money(&mut errors, "price", p),
            None => {
                errors.add("price", "The price field is required.");
                None
            }
        };
        let quantity = match self.quantity {
            Some(q) => count(&mut errors, "quantity", q),
            None => {
                errors.add("quantity", "The quantity field is required.");
                None
            }
        };
        let sale_price = self
            .sale_price
            .flatten()
            .and_then(|s| money(&mut errors, "sale_price", s));
        let threshold = self
            .low_stock_threshold
            .and_then(|t| count(&mut errors, "low_stock_threshold", t));
        if let (Some(price), Some(sale)) = (price, sale_price)
            && sale >= price
        {
            errors.add("sale_price", "The sale_price field must be less than price.");
        }
        errors.into_result()?;

        let (Some(name), Some(sku), Some(price), Some(quantity)) = (name, sku, price, quantity)
        else {
            return Err(DomainError::validation("name", "The given data was invalid."));
        };

        let mut product = NewProduct::new(name, sku, price, quantity);
        product.sale_price = sale_price;
        product.description = self.description.flatten();
        product.category_id = self.category_id.flatten().map(CategoryId::new);
        product.primary_image_url = self.primary_image_url.flatten();
        if let Some(threshold) = threshold {
            product.low_stock_threshold = threshold;
        }
        if let Some(active) = self.is_active {
            product.is_active = active;
        }
        if let Some(featured) = self.is_featured {
            product.is_featured = featured;
        }
        Ok(product)
    }

    /// Validates a partial update against the product's current values.
    pub fn into_changes(self, current: &Product) -> Result<ProductChanges, DomainError> {
        let mut errors = ValidationErrors::new();
        let mut changes = ProductChanges::default();

        if self.name.is_some() {
            changes.name = required(&mut errors, "name", self.name.as_deref(), NAME_MAX);
            changes.slug = changes
                .name
                .as_deref()
                .filter(|n| *n != current.name)
                .map(slugify);
        }
        if self.sku.is_some() {
            changes.sku = required(&mut errors, "sku", self.sku.as_deref(), SKU_MAX);
        }
        if let Some(description) = self.description {
            changes.description = Some(optional(
                &mut errors,
                "description",
                description.as_deref(),
                usize::MAX,
            ));
        }
        changes.category_id = self.category_id.map(|c| c.map(CategoryId::new));
        changes.price = self.price.and_then(|p| money(&mut errors, "price", p));
        if let Some(sale) = self.sale_price {
            changes.sale_price = match sale {
                Some(s) => money(&mut errors, "sale_price", s).map(Some),
                None => Some(None),
            };
        }
        changes.quantity = self.quantity.and_then(|q| count(&mut errors, "quantity", q));
        changes.low_stock_threshold = self
            .low_stock_threshold
            .and_then(|t| count(&mut errors, "low_stock_threshold", t));
        changes.is_active = self.is_active;
        changes.is_featured = self.is_featured;
        changes.primary_image_url = self.primary_image_url;

        let price = changes.price.unwrap_or(current.price);
        let sale = changes.sale_price.unwrap_or(current.sale_price);
        if let Some(sale) = sale
            && sale >= price
            && (changes.price.is_some() || changes.sale_price.is_some())
        {
            errors.add("sale_price", "The sale_price field must be less than price.");
        }

        errors.into_result()?;
        Ok(changes)
    }
}

/// Raw `true`/`1`/`on`/`yes` query flags.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(matches!(
        raw.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "on" | "yes")
    ))
}

fn price_bound(field: &str, value: Option<f64>) -> Result<Option<Money>, DomainError> {
    match value {
        None => Ok(None),
        Some(v) => match Money::from_decimal(v) {
            Some(m) if !m.is_negative() => Ok(Some(m)),
            _ => Err(DomainError::validation(
                field,
                format!("The {field} field must be at least 0."),
            )),
        },
    }
}

fn sort_field(field: &str, value: Option<&str>) -> Result<ProductSortField, DomainError> {
    match value {
        None => Ok(ProductSortField::default()),
        Some(v) => ProductSortField::parse(v).ok_or_else(|| {
            DomainError::validation(field, format!("The selected {field} is invalid."))
        }),
    }
}

/// Public catalog listing parameters, as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListParams {
    /// Category slug.
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    pub in_stock: bool,
    /// `name`, `price` or `created_at`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductListParams {
    /// Builds the storefront filter. The category slug is resolved by
    /// [`CatalogService::list_active`].
    pub fn to_filter(&self) -> Result<(ProductFilter, PageRequest), DomainError> {
        let filter = ProductFilter {
            active_only: true,
            category_id: self.category_id.map(CategoryId::new),
            featured: self.featured,
            search: non_blank(&self.search).map(str::to_string),
            min_price: price_bound("min_price", self.min_price)?,
            max_price: price_bound("max_price", self.max_price)?,
            in_stock: self.in_stock,
            status: None,
            sort_by: sort_field("sort", non_blank(&self.sort))?,
            direction: parse_direction("order", non_blank(&self.order))?,
        };
        let per_page = self.per_page.map(|n| n.min(PUBLIC_MAX_PER_PAGE));
        let page = PageRequest::from_query(self.page, per_page, PRODUCTS_PER_PAGE);
        Ok((filter, page))
    }
}

/// Admin catalog listing parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminProductParams {
    pub search: Option<String>,
    pub category_id: Option<i64>,
    /// `active`, `inactive`, `low_stock` or `out_of_stock`.
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AdminProductParams {
    pub fn to_filter(&self) -> Result<(ProductFilter, PageRequest), DomainError> {
        let status = non_blank(&self.status)
            .map(|s| {
                ProductStatus::parse(s).ok_or_else(|| {
                    DomainError::validation("status", "The selected status is invalid.")
                })
            })
            .transpose()?;
        let filter = ProductFilter {
            category_id: self.category_id.map(CategoryId::new),
            search: non_blank(&self.search).map(str::to_string),
            status,
            sort_by: sort_field("sort_by", non_blank(&self.sort_by))?,
            direction: parse_direction("sort_order", non_blank(&self.sort_order))?,
            ..Default::default()
        };
        let page = PageRequest::from_query(self.page, self.per_page, ADMIN_PRODUCTS_PER_PAGE);
        Ok((filter, page))
    }
}

/// Catalog reads for shoppers and writes for admins.
#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Active products matching `params`. An unknown category slug matches
    /// nothing.
    #[tracing::instrument(skip(self))]
    pub async fn list_active(
        &self,
        params: &ProductListParams,
    ) -> Result<Page<Product>, DomainError> {
        let (mut filter, page) = params.to_filter()?;
        if let Some(slug) = non_blank(&params.category) {
            match self.store.find_category_by_slug(slug).await? {
                Some(category) => filter.category_id = Some(category.id),
                None => return Ok(Page::new(Vec::new(), page, 0)),
            }
        }
        Ok(self.store.list_products(&filter, page).await?)
    }

    /// Up to [`FEATURED_LIMIT`] active featured products, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn featured(&self) -> Result<Vec<Product>, DomainError> {
        let filter = ProductFilter {
            active_only: true,
            featured: Some(true),
            ..Default::default()
        };
        let page = PageRequest::new(1, FEATURED_LIMIT);
        Ok(self.store.list_products(&filter, page).await?.items)
    }

    /// One product as a shopper sees it, by slug or, failing that, by
    /// numeric id. Inactive products are not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_active(&self, key: &str) -> Result<Product, DomainError> {
        let mut found = self.store.find_product_by_slug(key).await?;
        if found.is_none()
            && let Ok(id) = key.parse::<ProductId>()
        {
            found = self.store.get_product(id).await?;
        }
        match found {
            Some(product) if product.is_active => Ok(product),
            _ => Err(DomainError::product_not_found()),
        }
    }

    /// Any product, active or not.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Product, DomainError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(DomainError::product_not_found)
    }

    /// Admin listing over every product.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(
        &self,
        params: &AdminProductParams,
    ) -> Result<Page<Product>, DomainError> {
        let (filter, page) = params.to_filter()?;
        Ok(self.store.list_products(&filter, page).await?)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, input: ProductInput) -> Result<Product, DomainError> {
        let mut new = input.into_new_product()?;
        self.ensure_category(new.category_id).await?;
        new.slug = self.unique_slug(&new.slug, None).await?;
        let product = self.store.insert_product(new).await?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: ProductId, input: ProductInput) -> Result<Product, DomainError> {
        let current = self.get(id).await?;
        let mut changes = input.into_changes(&current)?;
        if changes.is_empty() {
            return Ok(current);
        }
        if let Some(category_id) = changes.category_id {
            self.ensure_category(category_id).await?;
        }
        if let Some(slug) = &changes.slug {
            changes.slug = Some(self.unique_slug(slug, Some(id)).await?);
        }
        self.store
            .update_product(id, changes)
            .await?
            .ok_or_else(DomainError::product_not_found)
    }

    /// Deletes a product. Placed orders keep their item snapshots.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<(), DomainError> {
        if self.store.delete_product(id).await? {
            tracing::info!(product_id = %id, "product deleted");
            Ok(())
        } else {
            Err(DomainError::product_not_found())
        }
    }

    /// Flips the active flag.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_active(&self, id: ProductId) -> Result<Product, DomainError> {
        let current = self.get(id).await?;
        let changes = ProductChanges {
            is_active: Some(!current.is_active),
            ..Default::default()
        };
        self.store
            .update_product(id, changes)
            .await?
            .ok_or_else(DomainError::product_not_found)
    }

    async fn ensure_category(&self, id: Option<CategoryId>) -> Result<(), DomainError> {
        match id {
            Some(id) if self.store.get_category(id).await?.is_none() => Err(
                DomainError::validation("category_id", "The selected category_id is invalid."),
            ),
            _ => Ok(()),
        }
    }

    /// `base`, or `base-1`, `base-2`, ... whichever no other product uses.
    async fn unique_slug(
        &self,
        base: &str,
        owner: Option<ProductId>,
    ) -> Result<String, DomainError> {
        let mut candidate = base.to_string();
        let mut n = 0;
        while let Some(other) = self.store.find_product_by_slug(&candidate).await? {
            if Some(other.id) == owner {
                break;
            }
            n += 1;
            candidate = format!("{base}-{n}");
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn input(body: serde_json::Value) -> ProductInput {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn new_product_from_input() {
        let product = input(json!({
            "name": "Trail Runner",
            "sku": "TR-1",
            "price": 50.0,
            "sale_price": 40.0,
            "quantity": 10,
            "is_featured": true
        }))
        .into_new_product()
        .unwrap();

        assert_eq!(product.slug, "trail-runner");
        assert_eq!(product.price, Money::from_cents(5000));
        assert_eq!(product.sale_price, Some(Money::from_cents(4000)));
        assert!(product.is_active);
        assert!(product.is_featured);
    }

    #[test]
    fn prices_are_capped_at_the_column_maximum() {
        let at_cap = input(json!({
            "name": "Yacht", "sku": "Y-1", "price": 99_999_999.99, "quantity": 1
        }))
        .into_new_product()
        .unwrap();
        assert_eq!(at_cap.price, PRICE_MAX);

        let err = input(json!({
            "name": "Yacht", "sku": "Y-1", "price": 100_000_000.0, "quantity": 1
        }))
        .into_new_product()
        .unwrap_err();
        assert!(matches!(&err, DomainError::Validation(e) if e.contains("price")));

        let err = input(json!({
            "name": "Yacht", "sku": "Y-1", "price": 10.0, "sale_price": 1e15, "quantity": 1
        }))
        .into_new_product()
        .unwrap_err();
        assert!(matches!(&err, DomainError::Validation(e) if e.contains("sale_price")));
    }

    #[test]
    fn new_product_requires_fields_and_sane_prices() {
        let err = input(json!({"price": -1.0, "sale_price": 2.0, "quantity": -3}))
            .into_new_product()
            .unwrap_err();
        let DomainError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["name", "sku", "price", "quantity"] {
            assert!(errors.contains(field), "missing error on {field}");
        }

        let err = input(json!({
            "name": "A", "sku": "A", "price": 10.0, "sale_price": 10.0, "quantity": 1
        }))
        .into_new_product()
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(e) if e.contains("sale_price")));
    }

    #[test]
    fn changes_distinguish_absent_from_null() {
        let current = NewProduct::new("Mug", "MUG-1", Money::from_cents(1000), 5)
            .with_sale_price(Money::from_cents(800))
            .into_product(ProductId::new(1), Utc::now());

        let changes = input(json!({"quantity": 7})).into_changes(&current).unwrap();
        assert_eq!(changes.quantity, Some(7));
        assert_eq!(changes.sale_price, None);

        let changes = input(json!({"sale_price": null})).into_changes(&current).unwrap();
        assert_eq!(changes.sale_price, Some(None));
    }

    #[test]
    fn renaming_updates_the_slug() {
        let current = NewProduct::new("Mug", "MUG-1", Money::from_cents(1000), 5)
            .into_product(ProductId::new(1), Utc::now());
        let changes = input(json!({"name": "Big Mug"})).into_changes(&current).unwrap();
        assert_eq!(changes.slug.as_deref(), Some("big-mug"));

        let same = input(json!({"name": "Mug"})).into_changes(&current).unwrap();
        assert_eq!(same.slug, None);
    }

    #[test]
    fn lowering_price_below_sale_is_rejected() {
        let current = NewProduct::new("Mug", "MUG-1", Money::from_cents(1000), 5)
            .with_sale_price(Money::from_cents(800))
            .into_product(ProductId::new(1), Utc::now());
        let err = input(json!({"price": 7.5})).into_changes(&current).unwrap_err();
        assert!(matches!(err, DomainError::Validation(e) if e.contains("sale_price")));
    }

    #[test]
    fn list_params_default_to_active_products_newest_first() {
        let (filter, page) = ProductListParams {
            search: Some("  ".into()),
            ..Default::default()
        }
        .to_filter()
        .unwrap();
        assert!(filter.active_only);
        assert_eq!(filter.search, None);
        assert_eq!(filter.sort_by, ProductSortField::CreatedAt);
        assert_eq!(filter.direction, store::SortDirection::Descending);
        assert_eq!(page.per_page, PRODUCTS_PER_PAGE);
    }

    #[test]
    fn list_params_parse_price_stock_sort_and_cap_page_size() {
        let params: ProductListParams = serde_json::from_value(json!({
            "min_price": 10.5,
            "max_price": 99.0,
            "in_stock": "1",
            "sort": "price",
            "order": "ASC",
            "per_page": 500
        }))
        .unwrap();
        let (filter, page) = params.to_filter().unwrap();
        assert_eq!(filter.min_price, Some(Money::from_cents(1050)));
        assert_eq!(filter.max_price, Some(Money::from_cents(9900)));
        assert!(filter.in_stock);
        assert_eq!(filter.sort_by, ProductSortField::Price);
        assert_eq!(filter.direction, store::SortDirection::Ascending);
        assert_eq!(page.per_page, PUBLIC_MAX_PER_PAGE);

        let bad = ProductListParams {
            sort: Some("password".into()),
            ..Default::default()
        };
        assert!(matches!(bad.to_filter(), Err(DomainError::Validation(e)) if e.contains("sort")));

        let negative = ProductListParams {
            min_price: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.to_filter().is_err());
    }

    #[test]
    fn admin_params_parse_status_and_default_page_size() {
        let (filter, page) = AdminProductParams {
            status: Some("low_stock".into()),
            sort_by: Some("name".into()),
            sort_order: Some("asc".into()),
            ..Default::default()
        }
        .to_filter()
        .unwrap();
        assert!(!filter.active_only);
        assert_eq!(filter.status, Some(ProductStatus::LowStock));
        assert_eq!(filter.sort_by, ProductSortField::Name);
        assert_eq!(page.per_page, ADMIN_PRODUCTS_PER_PAGE);

        let bad = AdminProductParams {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert!(matches!(bad.to_filter(), Err(DomainError::Validation(e)) if e.contains("status")));
    }
}
