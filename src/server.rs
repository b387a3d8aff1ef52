//! Axum router construction.
//!
//! The [`app`] function wires the paste endpoint, static files, health
//! and metrics routes and returns a ready-to-serve [`axum::Router`].
//! The paste endpoint dispatches on the HTTP method alone.

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::paste::{create_paste, delete_paste, index, unsupported_method};
use crate::metrics::{init_metrics, metrics_handler, metrics_middleware};
use crate::AppState;

/// Value of the `Server` response header.
const SERVER_NAME: &str = "makaroni";

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.server.max_upload_size).unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route(
            "/",
            get(index)
                // axum would otherwise answer HEAD through the GET handler.
                .head(unsupported_method)
                .post(create_paste)
                .delete(delete_paste)
                .fallback(unsupported_method),
        )
        .route("/health", get(health_check))
        .nest_service("/static", ServeDir::new(&state.config.site.static_dir));

    if state.config.observability.metrics {
        init_metrics();
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

// -- Common headers middleware -----------------------------------------------

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `makaroni`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static(SERVER_NAME));

    response
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse a raw query string into a map; later duplicates win.
pub(crate) fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&').filter(|part| !part.is_empty()) {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            map.insert(decode_component(k), decode_component(v));
        }
    }
    map
}

/// Percent-decode a query component, treating `+` as a space.
fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    percent_encoding::percent_decode_str(&value)
        .decode_utf8_lossy()
        .into_owned()
}
