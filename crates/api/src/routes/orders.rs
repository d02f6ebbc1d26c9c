//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use domain::orders::CUSTOMER_PER_PAGE;
use serde::Deserialize;
use store::{PageRequest, StorefrontStore};

use super::AppState;
use crate::auth::{AuthUser, Viewer};
use crate::error::ApiError;
use crate::resources::{Data, OrderResource, Paginated};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /v1/orders: the caller's order history, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Paginated<OrderResource>>, ApiError> {
    let Query(params) = params?;
    let page = PageRequest::from_query(params.page, params.per_page, CUSTOMER_PER_PAGE);
    let orders = state.orders.list_for_user(user, page).await?;
    Ok(Json(Paginated::from_page(orders, OrderResource::from)))
}

/// GET /v1/orders/{order_number}: one order, if the caller may see it.
#[tracing::instrument(skip(state))]
pub async fn show<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Viewer(viewer): Viewer,
    Path(order_number): Path<String>,
) -> Result<Json<Data<OrderResource>>, ApiError> {
    let order = state.orders.find_by_number(&order_number, viewer).await?;
    Ok(Json(Data::new(order.into())))
}
