//! Catalog records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CategoryId, Money, ProductId, SortDirection};

/// Default `low_stock_threshold` for new products.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// A catalog product as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    /// List price.
    pub price: Money,
    /// Only honoured when lower than `price`.
    pub sale_price: Option<Money>,
    /// Quantity on hand. Never negative.
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub primary_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// True when a sale price is set and is lower than the list price.
    pub fn is_on_sale(&self) -> bool {
        matches!(self.sale_price, Some(sale) if sale < self.price)
    }

    /// The price a customer pays right now.
    pub fn current_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.low_stock_threshold
    }

    /// Whether `requested` units can be sold from this product.
    pub fn can_fulfill(&self, requested: u64) -> bool {
        self.is_active
            && u64::try_from(self.quantity).is_ok_and(|stock| stock > 0 && stock >= requested)
    }

    /// Percentage off the list price, rounded to the nearest integer.
    pub fn discount_percent(&self) -> u32 {
        match self.sale_price {
            Some(sale) if sale < self.price && self.price.is_positive() => {
                let off = (self.price - sale).cents() as f64 / self.price.cents() as f64;
                (off * 100.0).round() as u32
            }
            _ => 0,
        }
    }
}

/// Fields for inserting a product. Ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub primary_image_url: Option<String>,
}

impl NewProduct {
    /// An active, non-featured product with the default low-stock threshold.
    pub fn new(
        name: impl Into<String>,
        sku: impl Into<String>,
        price: Money,
        quantity: i32,
    ) -> Self {
        let name = name.into();
        Self {
            category_id: None,
            slug: slugify(&name),
            name,
            sku: sku.into(),
            description: None,
            price,
            sale_price: None,
            quantity,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            is_active: true,
            is_featured: false,
            primary_image_url: None,
        }
    }

    pub fn with_sale_price(mut self, sale_price: Money) -> Self {
        self.sale_price = Some(sale_price);
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn featured(mut self) -> Self {
        self.is_featured = true;
        self
    }

    /// Materialises the row the store will hold.
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> Product {
        Product {
            id,
            category_id: self.category_id,
            name: self.name,
            slug: self.slug,
            sku: self.sku,
            description: self.description,
            price: self.price,
            sale_price: self.sale_price,
            quantity: self.quantity,
            low_stock_threshold: self.low_stock_threshold,
            is_active: self.is_active,
            is_featured: self.is_featured,
            primary_image_url: self.primary_image_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial product update. `None` leaves a field unchanged; for nullable
/// columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductChanges {
    pub category_id: Option<Option<CategoryId>>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sku: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<Money>,
    pub sale_price: Option<Option<Money>>,
    pub quantity: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub primary_image_url: Option<Option<String>>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the changes in place. Does not touch `updated_at`.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(slug) = &self.slug {
            product.slug = slug.clone();
        }
        if let Some(sku) = &self.sku {
            product.sku = sku.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(sale_price) = self.sale_price {
            product.sale_price = sale_price;
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(threshold) = self.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        if let Some(is_featured) = self.is_featured {
            product.is_featured = is_featured;
        }
        if let Some(url) = &self.primary_image_url {
            product.primary_image_url = url.clone();
        }
    }
}

/// Admin listing status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    Active,
    Inactive,
    /// In stock but at or below the low-stock threshold.
    LowStock,
    OutOfStock,
}

impl ProductStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "low_stock" => Some(Self::LowStock),
            "out_of_stock" => Some(Self::OutOfStock),
            _ => None,
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        match self {
            Self::Active => product.is_active,
            Self::Inactive => !product.is_active,
            Self::LowStock => product.is_low_stock(),
            Self::OutOfStock => product.is_out_of_stock(),
        }
    }
}

/// Column a product listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSortField {
    #[default]
    CreatedAt,
    Name,
    Price,
}

impl ProductSortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Name => "name",
            Self::Price => "price_cents",
        }
    }
}

/// Catalog listing filter. Filters are combined with AND; the default sort
/// is newest first.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Only products with `is_active`.
    pub active_only: bool,
    pub category_id: Option<CategoryId>,
    pub featured: Option<bool>,
    /// Case-insensitive substring of name or SKU.
    pub search: Option<String>,
    /// Inclusive bounds on the list price.
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// Only products with stock on hand.
    pub in_stock: bool,
    pub status: Option<ProductStatus>,
    pub sort_by: ProductSortField,
    pub direction: SortDirection,
}

impl ProductFilter {
    /// The storefront view: active products only.
    pub fn storefront() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if let Some(category_id) = self.category_id
            && product.category_id != Some(category_id)
        {
            return false;
        }
        if let Some(featured) = self.featured
            && product.is_featured != featured
        {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !product.name.to_lowercase().contains(&term)
                && !product.sku.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min)
            || self.max_price.is_some_and(|max| product.price > max)
        {
            return false;
        }
        if self.in_stock && !product.in_stock() {
            return false;
        }
        if let Some(status) = self.status
            && !status.matches(product)
        {
            return false;
        }
        true
    }

    /// In-process ordering matching the SQL `ORDER BY`, ties broken by id.
    pub fn compare(&self, a: &Product, b: &Product) -> std::cmp::Ordering {
        let ordering = match self.sort_by {
            ProductSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            ProductSortField::Name => a.name.cmp(&b.name),
            ProductSortField::Price => a.price.cmp(&b.price),
        }
        .then(a.id.cmp(&b.id));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Catalog counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProductStats {
    pub total: u64,
    pub active: u64,
    pub low_stock: u64,
    pub out_of_stock: u64,
}

/// Lowercase, ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
