//! Prometheus recorder setup and scrape endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Label attached to every series this process exports.
pub const SERVICE_LABEL: &str = "storefront";

/// Checkout latency buckets, in seconds.
const CHECKOUT_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

fn describe_storefront_metrics() {
    metrics::describe_counter!("checkout_orders_placed_total", "Orders placed successfully");
    metrics::describe_counter!(
        "checkout_failures_total",
        "Rejected or failed checkouts, by reason"
    );
    metrics::describe_counter!(
        "order_number_collisions_total",
        "Order numbers redrawn after a unique-constraint hit"
    );
    metrics::describe_counter!(
        "order_status_updates_total",
        "Admin status changes, by new status"
    );
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "Time to validate, price and persist a checkout"
    );
}

/// Installs the global Prometheus recorder for the storefront and returns
/// the handle the scrape endpoint renders from.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .add_global_label("service", SERVICE_LABEL)
        .set_buckets_for_metric(
            Matcher::Full("checkout_duration_seconds".to_string()),
            CHECKOUT_BUCKETS,
        )?
        .install_recorder()?;
    describe_storefront_metrics();
    Ok(handle)
}

/// GET /metrics: checkout and order counters in Prometheus text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        handle.render(),
    )
}
