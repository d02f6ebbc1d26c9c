//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ValidationErrors};
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No identity on a route that needs one.
    Unauthenticated,
    /// Identity present but not allowed.
    Forbidden,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a ValidationErrors>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => {
                error_response(StatusCode::UNAUTHORIZED, "Authentication required")
            }
            ApiError::Forbidden => error_response(StatusCode::FORBIDDEN, "Forbidden"),
            ApiError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        message: message.into(),
        errors: None,
    };
    (status, axum::Json(body)).into_response()
}

fn unprocessable(message: String, errors: &ValidationErrors) -> Response {
    let body = ErrorBody {
        message,
        errors: Some(errors),
    };
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
}

fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match &err {
        DomainError::Validation(errors) => unprocessable(message, errors),
        // Cart problems are reported against the `items` field
        DomainError::ItemNotFound { .. } | DomainError::InsufficientStock { .. } => {
            unprocessable(message.clone(), &ValidationErrors::single("items", message))
        }
        DomainError::NotFound { .. } => error_response(StatusCode::NOT_FOUND, message),
        DomainError::InvalidStatusTransition { .. } => {
            error_response(StatusCode::CONFLICT, message)
        }
        DomainError::Persistence(_) => {
            tracing::error!(error = %err, "persistence failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                ApiError::Domain(DomainError::validation("body", e.body_text()))
            }
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use store::{OrderStatus, ProductId, StoreError};

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_maps_to_422_with_field_errors() {
        let err = ApiError::from(DomainError::validation(
            "shipping.email",
            "The shipping.email field is required.",
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = body_json(response).await;
        assert_eq!(json["message"], "The shipping.email field is required.");
        assert_eq!(
            json["errors"]["shipping.email"][0],
            "The shipping.email field is required."
        );
    }

    #[tokio::test]
    async fn test_stock_errors_are_reported_on_items() {
        let err = ApiError::from(DomainError::InsufficientStock {
            product_id: ProductId::new(1),
            product_name: "Mug".into(),
            requested: 3,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(
            json["errors"]["items"][0],
            "Mug is out of stock or has insufficient quantity."
        );
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = [
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                DomainError::order_not_found().into(),
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::InvalidStatusTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Pending,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::Persistence(StoreError::Backend("down".into())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response =
            ApiError::from(DomainError::Persistence(StoreError::Backend("secret".into())))
                .into_response();
        let json = body_json(response).await;
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("errors").is_none());
    }
}
