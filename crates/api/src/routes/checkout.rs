//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::CheckoutRequest;
use store::StorefrontStore;

use super::AppState;
use crate::auth::Viewer;
use crate::error::ApiError;
use crate::resources::{Message, OrderResource};

/// POST /v1/checkout: prices the cart, reserves stock and places the order.
///
/// Guests may check out; an identified caller becomes the order owner.
#[tracing::instrument(skip(state, payload))]
pub async fn place<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Viewer(viewer): Viewer,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message<OrderResource>>), ApiError> {
    let Json(request) = payload?;
    let order = state.checkout.place_order(&request, viewer).await?;

    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "Order placed successfully",
            data: Some(order.into()),
        }),
    ))
}
