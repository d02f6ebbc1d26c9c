//! Administrative endpoints: dashboard, order management and product management.
//!
//! Every handler requires [`AdminUser`].

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::orders::{parse_payment_status, parse_status};
use domain::{AdminOrderFilter, AdminProductParams, CategoryInput, DomainError, ProductInput};
use serde::{Deserialize, Serialize};
use store::{OrderId, ProductId, StorefrontStore};

use super::{AppState, parse_id};
use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::resources::{
    CategoryResource, Data, Message, OrderResource, Paginated, ProductResource,
    RecentOrderResource,
};

#[derive(Debug, Serialize)]
pub struct OrderCounts {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub delivered: u64,
}

#[derive(Debug, Serialize)]
pub struct ProductCounts {
    pub total: u64,
    pub active: u64,
    pub low_stock: u64,
    pub out_of_stock: u64,
}

#[derive(Debug, Serialize)]
pub struct DailyRevenueResource {
    pub date: String,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct RevenueSummary {
    pub total: f64,
    pub by_day: Vec<DailyRevenueResource>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub revenue: RevenueSummary,
    pub orders: OrderCounts,
    pub products: ProductCounts,
    pub recent_orders: Vec<RecentOrderResource>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusBody {
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    pub notes: Option<String>,
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, DomainError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DomainError::validation(field, format!("The {field} field is required.")))
}

/// GET /v1/admin/dashboard
#[tracing::instrument(skip(state, _admin))]
pub async fn dashboard<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Data<DashboardResponse>>, ApiError> {
    let stats = state.dashboard.stats().await?;
    let orders = stats.orders;
    let products = stats.products;

    Ok(Json(Data::new(DashboardResponse {
        revenue: RevenueSummary {
            total: orders.revenue.to_decimal(),
            by_day: stats
                .revenue_by_day
                .iter()
                .map(|day| DailyRevenueResource {
                    date: day.date.format("%Y-%m-%d").to_string(),
                    revenue: day.revenue.to_decimal(),
                })
                .collect(),
        },
        orders: OrderCounts {
            total: orders.total,
            pending: orders.pending,
            processing: orders.processing,
            delivered: orders.delivered,
        },
        products: ProductCounts {
            total: products.total,
            active: products.active,
            low_stock: products.low_stock,
            out_of_stock: products.out_of_stock,
        },
        recent_orders: stats.recent_orders.into_iter().map(Into::into).collect(),
    })))
}

/// GET /v1/admin/orders
#[tracing::instrument(skip(state, _admin, filter))]
pub async fn list_orders<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    filter: Result<Query<AdminOrderFilter>, QueryRejection>,
) -> Result<Json<Paginated<OrderResource>>, ApiError> {
    let Query(filter) = filter?;
    let (query, page) = filter.to_query()?;
    let orders = state.orders.list(&query, page).await?;
    Ok(Json(Paginated::from_page(orders, OrderResource::from)))
}

/// GET /v1/admin/orders/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn show_order<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Data<OrderResource>>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.get(id).await?;
    Ok(Json(Data::new(order.into())))
}

/// PATCH /v1/admin/orders/{id}/status
#[tracing::instrument(skip(state, admin, body))]
pub async fn update_order_status<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<Message<OrderResource>>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let Json(body) = body?;
    let status = parse_status("status", required("status", &body.status)?)?;

    let order = state.orders.update_status(id, status).await?;
    tracing::info!(
        admin_id = %admin.0,
        order_id = %id,
        status = %status,
        "admin updated order status"
    );

    Ok(Json(Message {
        message: "Order status updated successfully",
        data: Some(order.into()),
    }))
}

/// PATCH /v1/admin/orders/{id}/payment-status
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update_payment_status<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<PaymentStatusBody>, JsonRejection>,
) -> Result<Json<Message<OrderResource>>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let Json(body) = body?;
    let status = parse_payment_status(
        "payment_status",
        required("payment_status", &body.payment_status)?,
    )?;

    let order = state.orders.update_payment_status(id, status).await?;
    Ok(Json(Message {
        message: "Payment status updated successfully",
        data: Some(order.into()),
    }))
}

/// PATCH /v1/admin/orders/{id}/notes
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update_notes<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<NotesBody>, JsonRejection>,
) -> Result<Json<Message<OrderResource>>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let Json(body) = body?;
    let order = state
        .orders
        .update_notes(id, body.notes.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(Message {
        message: "Order notes updated successfully",
        data: Some(order.into()),
    }))
}

/// GET /v1/admin/products: every product, active or not.
#[tracing::instrument(skip(state, _admin, params))]
pub async fn list_products<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    params: Result<Query<AdminProductParams>, QueryRejection>,
) -> Result<Json<Paginated<ProductResource>>, ApiError> {
    let Query(params) = params?;
    let products = state.catalog.list_all(&params).await?;
    Ok(Json(Paginated::from_page(products, ProductResource::from)))
}

/// POST /v1/admin/products
#[tracing::instrument(skip(state, _admin, body))]
pub async fn create_product<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Message<ProductResource>>), ApiError> {
    let Json(input) = body?;
    let product = state.catalog.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "Product created successfully",
            data: Some(product.into()),
        }),
    ))
}

/// GET /v1/admin/products/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn show_product<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Data<ProductResource>>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.catalog.get(id).await?;
    Ok(Json(Data::new(product.into())))
}

/// PUT /v1/admin/products/{id}: partial update; absent fields are kept.
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update_product<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<Message<ProductResource>>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    let Json(input) = body?;
    let product = state.catalog.update(id, input).await?;
    Ok(Json(Message {
        message: "Product updated successfully",
        data: Some(product.into()),
    }))
}

/// DELETE /v1/admin/products/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete_product<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Message<()>>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    state.catalog.delete(id).await?;
    Ok(Json(Message {
        message: "Product deleted successfully",
        data: None,
    }))
}

/// PATCH /v1/admin/products/{id}/toggle-status
#[tracing::instrument(skip(state, _admin))]
pub async fn toggle_product<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Message<ProductResource>>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.catalog.toggle_active(id).await?;
    let message = if product.is_active {
        "Product activated successfully"
    } else {
        "Product deactivated successfully"
    };
    Ok(Json(Message {
        message,
        data: Some(product.into()),
    }))
}

/// POST /v1/admin/categories
#[tracing::instrument(skip(state, _admin, body))]
pub async fn create_category<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<CategoryInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Message<CategoryResource>>), ApiError> {
    let Json(input) = body?;
    let category = state.categories.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "Category created successfully",
            data: Some(category.into()),
        }),
    ))
}
