//! Prometheus metrics for makaroni.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "makaroni_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path, status.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "makaroni_http_request_duration_seconds";

/// Pastes stored (counter). Labels: kind (`text` or `file`).
pub const PASTES_CREATED_TOTAL: &str = "makaroni_pastes_created_total";

/// Pastes revoked through the delete flow (counter).
pub const PASTES_DELETED_TOTAL: &str = "makaroni_pastes_deleted_total";

/// Text pastes too large to highlight (counter).
pub const HIGHLIGHT_SKIPPED_TOTAL: &str = "makaroni_highlight_skipped_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent, so tests may
/// call it repeatedly.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");
        describe_metrics();
        handle
    })
}

fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(PASTES_CREATED_TOTAL, "Pastes stored, by kind");
    describe_counter!(PASTES_DELETED_TOTAL, "Pastes deleted with a valid delete key");
    describe_counter!(
        HIGHLIGHT_SKIPPED_TOTAL,
        "Text pastes stored without highlighting because of their size"
    );
}

// -- Domain counters ----------------------------------------------------------

pub fn record_paste_created(kind: &'static str) {
    counter!(PASTES_CREATED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_paste_deleted() {
    counter!(PASTES_DELETED_TOTAL).increment(1);
}

pub fn record_highlight_skipped() {
    counter!(HIGHLIGHT_SKIPPED_TOTAL).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// `/metrics` itself is not instrumented.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status.clone()).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path, "status" => status).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Collapse request paths into a fixed label set.
///
/// - `/`, `/health`, `/metrics` -> themselves
/// - `/static/...` -> `/static`
/// - anything else -> `/other`
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        p if p == "/static" || p.starts_with("/static/") => "/static",
        _ => "/other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
