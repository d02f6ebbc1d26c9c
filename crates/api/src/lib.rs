//! HTTP API server for the storefront.
//!
//! Public catalog and checkout endpoints, customer order lookups and the
//! admin surface, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod resources;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{
    CatalogService, CategoryService, CheckoutService, DashboardService, OrderNumberGenerator,
    OrderService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::StorefrontStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use error::ApiError;
pub use routes::AppState;

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StorefrontStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let admin = Router::new()
        .route("/dashboard", get(routes::admin::dashboard::<S>))
        .route("/orders", get(routes::admin::list_orders::<S>))
        .route("/orders/{id}", get(routes::admin::show_order::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::admin::update_order_status::<S>),
        )
        .route(
            "/orders/{id}/payment-status",
            patch(routes::admin::update_payment_status::<S>),
        )
        .route("/orders/{id}/notes", patch(routes::admin::update_notes::<S>))
        .route(
            "/products",
            get(routes::admin::list_products::<S>).post(routes::admin::create_product::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::admin::show_product::<S>)
                .put(routes::admin::update_product::<S>)
                .delete(routes::admin::delete_product::<S>),
        )
        .route(
            "/products/{id}/toggle-status",
            patch(routes::admin::toggle_product::<S>),
        )
        .route("/categories", post(routes::admin::create_category::<S>));

    let v1 = Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/featured", get(routes::products::featured::<S>))
        .route("/products/{slug}", get(routes::products::show::<S>))
        .route("/categories", get(routes::categories::list::<S>))
        .route("/categories/{slug}", get(routes::categories::show::<S>))
        .route("/checkout", post(routes::checkout::place::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{order_number}", get(routes::orders::show::<S>))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/v1", v1)
        .fallback(not_found)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state, with every service sharing `store`.
pub fn create_default_state<S: StorefrontStore>(
    store: S,
    order_numbers: Arc<dyn OrderNumberGenerator>,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        checkout: CheckoutService::new(store.clone(), order_numbers),
        orders: OrderService::new(store.clone()),
        catalog: CatalogService::new(store.clone()),
        categories: CategoryService::new(store.clone()),
        dashboard: DashboardService::new(store),
    })
}
