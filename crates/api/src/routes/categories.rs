//! Public category endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use store::StorefrontStore;

use super::AppState;
use crate::error::ApiError;
use crate::resources::{CategoryResource, Data};

/// GET /v1/categories: active roots with their active children.
#[tracing::instrument(skip(state))]
pub async fn list<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Data<Vec<CategoryResource>>>, ApiError> {
    let tree = state.categories.tree().await?;
    Ok(Json(Data::new(tree.into_iter().map(Into::into).collect())))
}

/// GET /v1/categories/{slug}
#[tracing::instrument(skip(state))]
pub async fn show<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(slug): Path<String>,
) -> Result<Json<Data<CategoryResource>>, ApiError> {
    let detail = state.categories.show(&slug).await?;
    Ok(Json(Data::new(detail.into())))
}
