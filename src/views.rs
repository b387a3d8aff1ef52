//! Page view models.
//!
//! Each view is an askama template under `templates/`.  All pages share
//! the site links from [`SiteLinks`].

use askama::Template;

use crate::config::SiteConfig;

/// Links rendered in every page header.
#[derive(Debug, Clone, Default)]
pub struct SiteLinks {
    pub logo_url: String,
    pub index_url: String,
    pub favicon_url: String,
}

impl From<&SiteConfig> for SiteLinks {
    fn from(site: &SiteConfig) -> Self {
        Self {
            logo_url: site.logo_url.clone(),
            index_url: site.index_url.clone(),
            favicon_url: site.favicon_url.clone(),
        }
    }
}

/// Landing page with the paste form.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexView {
    pub site: SiteLinks,
    pub languages: Vec<String>,
    pub result_url_prefix: String,
}

/// Rendered text paste.
///
/// `content` is trusted highlighter markup when `highlighted` is set,
/// and raw text to be escaped into a `<pre>` block otherwise.
#[derive(Template)]
#[template(path = "paste.html")]
pub struct PasteView<'a> {
    pub site: SiteLinks,
    pub content: &'a str,
    pub highlighted: bool,
    pub download_url: String,
}

/// "File ready" page for uploaded files.
#[derive(Template)]
#[template(path = "download.html")]
pub struct DownloadView {
    pub site: SiteLinks,
    pub file_name: String,
    pub download_url: String,
    pub can_view: bool,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorView {
    pub site: SiteLinks,
    pub status_code: u16,
    pub message: String,
}

/// Whether a browser can display `content_type` inline.
pub fn can_view_in_browser(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.starts_with("image/")
        || essence.starts_with("video/")
        || essence.starts_with("audio/")
        || essence == "application/pdf"
        || essence == "application/json"
}
