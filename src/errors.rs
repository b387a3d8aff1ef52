//! HTTP-facing error types.
//!
//! Handlers return `Result<_, PasteError>`; every variant maps to a
//! status code and a user-facing message, and is rendered as the HTML
//! error page carrying the site links.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::highlight::HighlightError;
use crate::storage::backend::StoreError;
use crate::views::{ErrorView, SiteLinks};

/// Body sent when the error page itself cannot be rendered.
pub const FALLBACK_ERROR_BODY: &str = "<h1>Internal Server Error</h1>";

/// Errors surfaced by the paste controller.
#[derive(Debug, Error)]
pub enum PasteError {
    /// The request body is not a usable multipart form.
    #[error("Invalid form data: {message}")]
    InvalidForm { message: String },

    /// A method other than GET, POST or DELETE on the paste endpoint.
    #[error("Method {method} is not supported")]
    UnsupportedMethod { method: String },

    /// One of `raw`, `html`, `key` is missing or empty.
    #[error("Missing required parameters")]
    MissingDeleteParameters,

    /// The delete token does not match the stored one.
    #[error("Invalid delete key")]
    InvalidDeleteKey,

    /// Metadata lookup failed for a reason other than "not found".
    #[error("Object not found")]
    MetadataUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Some objects of a batched delete were not removed.
    #[error("Failed to delete {failed} of {total} objects")]
    DeleteFailed { failed: usize, total: usize },

    /// Any other storage failure.
    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Failed to highlight content")]
    Highlight(#[from] HighlightError),

    #[error("Failed to render page")]
    Render(#[from] askama::Error),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl PasteError {
    /// Wrap a storage error with a user-facing context message.
    pub fn storage(context: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::PartialDelete { failed, total } => {
                PasteError::DeleteFailed { failed, total }
            }
            source => PasteError::Storage { context, source },
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PasteError::InvalidForm { .. } => StatusCode::BAD_REQUEST,
            PasteError::UnsupportedMethod { .. } => StatusCode::BAD_REQUEST,
            PasteError::MissingDeleteParameters => StatusCode::BAD_REQUEST,
            PasteError::InvalidDeleteKey => StatusCode::FORBIDDEN,
            PasteError::MetadataUnavailable { .. } => StatusCode::NOT_FOUND,
            PasteError::DeleteFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PasteError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PasteError::Highlight(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PasteError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PasteError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the error and render it as the HTML error page.
    pub fn into_page(self, site: &SiteLinks) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed: {}", self);
        } else {
            tracing::info!("Request rejected ({}): {}", status.as_u16(), self);
        }

        let view = ErrorView {
            site: site.clone(),
            status_code: status.as_u16(),
            message: self.to_string(),
        };
        let body = match view.render() {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                FALLBACK_ERROR_BODY.to_string()
            }
        };

        (status, Html(body)).into_response()
    }
}

impl IntoResponse for PasteError {
    /// Render with empty site links; handlers that know the site use
    /// [`PasteError::into_page`].
    fn into_response(self) -> Response {
        self.into_page(&SiteLinks::default())
    }
}
