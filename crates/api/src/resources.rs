//! JSON shapes returned by the API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use domain::{CategoryDetail, CategoryNode};
use store::{Category, Money, Order, OrderItem, Page, Product};

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// `{"data": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{"message": ..., "data": ...}` envelope used by writes.
#[derive(Debug, Serialize)]
pub struct Message<T> {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Paginated `{"data": [...], "meta": {...}}` envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn from_page<U>(page: Page<U>, f: impl FnMut(U) -> T) -> Self {
        let meta = PageMeta {
            current_page: page.page,
            last_page: page.last_page(),
            per_page: page.per_page,
            total: page.total,
        };
        Self {
            data: page.items.into_iter().map(f).collect(),
            meta,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShippingResource {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub address_2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Serialize)]
pub struct TotalsResource {
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResource {
    pub id: i64,
    pub product_id: Option<i64>,
    pub product_name: String,
    pub product_sku: String,
    pub product_image: Option<String>,
    pub price: f64,
    pub quantity: u32,
    pub subtotal: f64,
}

impl From<OrderItem> for OrderItemResource {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id.get(),
            product_id: item.product_id.map(|p| p.get()),
            product_name: item.product_name,
            product_sku: item.product_sku,
            product_image: item.product_image,
            price: item.price.to_decimal(),
            quantity: item.quantity,
            subtotal: item.subtotal.to_decimal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResource {
    pub method: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OrderResource {
    pub id: i64,
    pub order_number: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub shipping: ShippingResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<store::BillingAddress>,
    pub totals: TotalsResource,
    pub item_count: u64,
    pub items: Vec<OrderItemResource>,
    pub payment: PaymentResource,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResource {
    fn from(order: Order) -> Self {
        let item_count = order.item_count();
        let name = order.shipping.full_name();
        let shipping = order.shipping;
        let totals = order.totals;
        Self {
            id: order.id.get(),
            order_number: order.order_number,
            status: order.status.as_str(),
            status_label: order.status.label(),
            shipping: ShippingResource {
                name,
                first_name: shipping.first_name,
                last_name: shipping.last_name,
                email: shipping.email,
                phone: shipping.phone,
                address: shipping.address,
                address_2: shipping.address_2,
                city: shipping.city,
                state: shipping.state,
                zip: shipping.zip,
                country: shipping.country,
            },
            billing: order.billing,
            totals: TotalsResource {
                subtotal: totals.subtotal.to_decimal(),
                shipping: totals.shipping_cost.to_decimal(),
                tax: totals.tax.to_decimal(),
                discount: totals.discount.to_decimal(),
                total: totals.total.to_decimal(),
            },
            item_count,
            items: order.items.into_iter().map(Into::into).collect(),
            payment: PaymentResource {
                method: order.payment_method,
                status: order.payment_status.as_str(),
            },
            notes: order.notes,
            created_at: timestamp(&order.created_at),
            updated_at: timestamp(&order.updated_at),
        }
    }
}

/// Condensed order line for the dashboard.
#[derive(Debug, Serialize)]
pub struct RecentOrderResource {
    pub id: i64,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub total: f64,
    pub status: &'static str,
    pub status_label: &'static str,
    pub created_at: String,
}

impl From<Order> for RecentOrderResource {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.get(),
            customer_name: order.shipping.full_name(),
            order_number: order.order_number,
            customer_email: order.shipping.email,
            total: order.totals.total.to_decimal(),
            status: order.status.as_str(),
            status_label: order.status.label(),
            created_at: timestamp(&order.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResource {
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub current_price: f64,
    pub is_on_sale: bool,
    pub discount_percent: u32,
    pub quantity: i32,
    pub is_in_stock: bool,
    pub is_low_stock: bool,
    pub is_active: bool,
    pub is_featured: bool,
    pub primary_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductResource {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.get(),
            category_id: product.category_id.map(|c| c.get()),
            price: product.price.to_decimal(),
            sale_price: product.sale_price.map(|m: Money| m.to_decimal()),
            current_price: product.current_price().to_decimal(),
            is_on_sale: product.is_on_sale(),
            discount_percent: product.discount_percent(),
            quantity: product.quantity,
            is_in_stock: product.in_stock(),
            is_low_stock: product.is_low_stock(),
            is_active: product.is_active,
            is_featured: product.is_featured,
            created_at: timestamp(&product.created_at),
            updated_at: timestamp(&product.updated_at),
            name: product.name,
            slug: product.slug,
            sku: product.sku,
            description: product.description,
            primary_image_url: product.primary_image_url,
        }
    }
}

/// A category with its product count. `children` and `parent` appear only
/// in views that load them.
#[derive(Debug, Serialize)]
pub struct CategoryResource {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<CategoryResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<CategoryResource>>,
}

impl From<Category> for CategoryResource {
    fn from(category: Category) -> Self {
        Self {
            id: category.id.get(),
            parent_id: category.parent_id.map(|p| p.get()),
            name: category.name,
            slug: category.slug,
            description: category.description,
            image_url: category.image_url,
            is_active: category.is_active,
            sort_order: category.sort_order,
            products_count: None,
            children: None,
            parent: None,
        }
    }
}

impl From<CategoryNode> for CategoryResource {
    fn from(node: CategoryNode) -> Self {
        Self {
            products_count: Some(node.products_count),
            children: Some(node.children.into_iter().map(Self::from).collect()),
            ..Self::from(node.category)
        }
    }
}

impl From<CategoryDetail> for CategoryResource {
    fn from(detail: CategoryDetail) -> Self {
        Self {
            parent: detail.parent.map(|p| Box::new(Self::from(p))),
            ..Self::from(detail.node)
        }
    }
}
