//! Public catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use domain::ProductListParams;
use store::StorefrontStore;

use super::AppState;
use crate::error::ApiError;
use crate::resources::{Data, Paginated, ProductResource};

/// GET /v1/products
#[tracing::instrument(skip(state, params))]
pub async fn list<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ProductListParams>, QueryRejection>,
) -> Result<Json<Paginated<ProductResource>>, ApiError> {
    let Query(params) = params?;
    let products = state.catalog.list_active(&params).await?;
    Ok(Json(Paginated::from_page(products, ProductResource::from)))
}

/// GET /v1/products/featured
#[tracing::instrument(skip(state))]
pub async fn featured<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Data<Vec<ProductResource>>>, ApiError> {
    let products = state.catalog.featured().await?;
    Ok(Json(Data::new(products.into_iter().map(Into::into).collect())))
}

/// GET /v1/products/{slug}: also accepts a numeric id.
#[tracing::instrument(skip(state))]
pub async fn show<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(slug): Path<String>,
) -> Result<Json<Data<ProductResource>>, ApiError> {
    let product = state.catalog.get_active(&slug).await?;
    Ok(Json(Data::new(product.into())))
}
