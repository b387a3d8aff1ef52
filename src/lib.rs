//! makaroni library: a paste-sharing service backed by S3-compatible
//! object storage.
//!
//! Submissions are highlighted (or kept as files), written to the
//! object store together with a rendered HTML page, and can later be
//! revoked with the delete key issued at creation time.

use std::sync::Arc;

use askama::Template;
use bytes::Bytes;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod highlight;
pub mod history;
pub mod keys;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod views;

use crate::config::Config;
use crate::highlight::Highlighter;
use crate::storage::backend::ObjectStore;
use crate::views::{IndexView, SiteLinks};

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Effective configuration, fixed at startup.
    pub config: Config,
    /// Object store holding raw and rendered pastes.
    pub store: Arc<dyn ObjectStore>,
    pub highlighter: Arc<dyn Highlighter>,
    /// Links rendered into every page.
    pub site: SiteLinks,
    /// Landing page, rendered once.
    pub index_page: Bytes,
}

impl AppState {
    /// Build the state and pre-render the landing page.
    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        highlighter: Arc<dyn Highlighter>,
    ) -> Result<Self, askama::Error> {
        let site = SiteLinks::from(&config.site);
        let index = IndexView {
            site: site.clone(),
            languages: highlighter.languages(),
            result_url_prefix: config.site.result_url_prefix.clone(),
        }
        .render()?;
        tracing::debug!("Rendered index page ({} bytes)", index.len());

        Ok(Self {
            config,
            store,
            highlighter,
            site,
            index_page: Bytes::from(index),
        })
    }
}
