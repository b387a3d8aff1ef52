//! Paste lifecycle handlers for `/`.
//!
//! - `GET` serves the pre-rendered landing page.
//! - `POST` stores a text paste or an uploaded file together with its
//!   rendered page, then redirects to the page.
//! - `DELETE` revokes a paste when the caller presents the delete key
//!   stored on both objects.
//! - Any other method is rejected with 400.

use std::collections::HashMap;
use std::sync::Arc;

use askama::Template;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use subtle::ConstantTimeEq;

use crate::errors::PasteError;
use crate::handlers::form::{read_paste_form, UploadedFile};
use crate::highlight::DEFAULT_SYNTAX;
use crate::history::{PasteHistory, PasteObject};
use crate::keys::PasteKeys;
use crate::metrics;
use crate::server::parse_query;
use crate::storage::backend::{ObjectMetadata, UploadSource};
use crate::views::{can_view_in_browser, DownloadView, PasteView};
use crate::AppState;

/// Text larger than this is stored without highlighting.
pub const MAX_HIGHLIGHT_BYTES: usize = 100 * 1024;

/// Metadata attribute holding the delete key on both objects.
pub const DELETE_METADATA_KEY: &str = "delete";

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// `GET /`
pub async fn index(State(state): State<Arc<AppState>>) -> Html<Bytes> {
    tracing::debug!("Sending index page");
    Html(state.index_page.clone())
}

/// `POST /`
pub async fn create_paste(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match create(&state, &headers, multipart).await {
        Ok(response) => response,
        Err(e) => e.into_page(&state.site),
    }
}

/// `DELETE /?raw=<key>&html=<key>&key=<delete key>`
pub async fn delete_paste(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Response {
    match delete(&state, parse_query(query)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_page(&state.site),
    }
}

/// Fallback for every other method on `/`.
pub async fn unsupported_method(State(state): State<Arc<AppState>>, method: Method) -> Response {
    tracing::warn!("Unsupported request method: {}", method);
    PasteError::UnsupportedMethod {
        method: method.to_string(),
    }
    .into_page(&state.site)
}

async fn create(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, PasteError> {
    let multipart = multipart.map_err(|rejection| PasteError::InvalidForm {
        message: rejection.body_text(),
    })?;
    let form = read_paste_form(multipart, state.config.server.multipart_max_memory).await?;

    if form.is_empty() {
        tracing::info!("Empty form content, redirecting to index");
        return found("/", None);
    }

    let keys = PasteKeys::generate();
    let metadata = ObjectMetadata::from([(DELETE_METADATA_KEY.to_string(), keys.delete.clone())]);

    let (keys, page, kind) = match form.file {
        Some(file) => {
            let keys = keys.with_file_extension(&file.file_name);
            let page = store_file(state, &keys, file, &metadata).await?;
            (keys, page, "file")
        }
        None => {
            let syntax = form.syntax.as_deref().map(str::trim).unwrap_or_default();
            let page = store_text(state, &keys, form.content, syntax, &metadata).await?;
            (keys, page, "text")
        }
    };

    state
        .store
        .upload_content(&keys.html, UploadSource::from(page), HTML_CONTENT_TYPE, &metadata)
        .await
        .map_err(|e| PasteError::storage("Failed to upload HTML content", e))?;
    tracing::info!("Uploaded HTML content with key: {}", keys.html);
    metrics::record_paste_created(kind);

    let mut history = PasteHistory::from_headers(headers).unwrap_or_default();
    history.push(PasteObject::from(&keys));
    let cookie = history.set_cookie_header()?;

    let location = format!("{}{}", state.config.site.result_url_prefix, keys.html);
    tracing::debug!("Redirecting to {}", location);
    found(&location, Some(cookie))
}

/// Upload the file as-is and render the download page.
async fn store_file(
    state: &AppState,
    keys: &PasteKeys,
    file: UploadedFile,
    metadata: &ObjectMetadata,
) -> Result<String, PasteError> {
    let file_name = file.file_name.clone();
    let content_type = file.content_type.clone();
    let size = file.size;

    state
        .store
        .upload_content(&keys.raw, file.into_source(), &content_type, metadata)
        .await
        .map_err(|e| PasteError::storage("Failed to upload file", e))?;
    tracing::info!(
        "Uploaded file {} with key: {} ({} bytes, {})",
        file_name,
        keys.raw,
        size,
        content_type
    );

    let page = DownloadView {
        site: state.site.clone(),
        can_view: can_view_in_browser(&content_type),
        file_name,
        download_url: format!("{}{}", state.config.site.result_url_prefix, keys.raw),
    }
    .render()?;
    Ok(page)
}

/// Highlight (or escape) the text, render the paste page, then upload
/// the raw text.
async fn store_text(
    state: &AppState,
    keys: &PasteKeys,
    content: String,
    syntax: &str,
    metadata: &ObjectMetadata,
) -> Result<String, PasteError> {
    let syntax = if syntax.is_empty() { DEFAULT_SYNTAX } else { syntax };

    let markup = if content.len() > MAX_HIGHLIGHT_BYTES {
        tracing::debug!(
            "Content size {} bytes exceeds {}, using pre tag",
            content.len(),
            MAX_HIGHLIGHT_BYTES
        );
        metrics::record_highlight_skipped();
        None
    } else {
        tracing::debug!("Highlighting {} bytes as {}", content.len(), syntax);
        let html = state
            .highlighter
            .highlight(&content, syntax, &state.config.site.style)?;
        Some(html)
    };

    let page = PasteView {
        site: state.site.clone(),
        content: markup.as_deref().unwrap_or(&content),
        highlighted: markup.is_some(),
        download_url: format!("{}{}", state.config.site.result_url_prefix, keys.raw),
    }
    .render()?;

    state
        .store
        .upload_content(&keys.raw, UploadSource::from(content), TEXT_CONTENT_TYPE, metadata)
        .await
        .map_err(|e| PasteError::storage("Failed to upload raw content", e))?;
    tracing::info!("Uploaded raw content with key: {}", keys.raw);
    Ok(page)
}

async fn delete(state: &AppState, params: HashMap<String, String>) -> Result<(), PasteError> {
    let (Some(raw), Some(html), Some(token)) = (
        required(&params, "raw"),
        required(&params, "html"),
        required(&params, "key"),
    ) else {
        tracing::warn!("Missing required parameters for deletion");
        return Err(PasteError::MissingDeleteParameters);
    };

    tracing::info!("Deleting paste with raw key: {}", raw);

    for key in [raw, html] {
        let metadata = match state.store.fetch_metadata(key).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => {
                tracing::info!("Object {} is already gone, nothing to delete", key);
                return Ok(());
            }
            Err(source) => {
                return Err(PasteError::MetadataUnavailable {
                    key: key.to_string(),
                    source,
                })
            }
        };

        if !delete_key_matches(metadata.get(DELETE_METADATA_KEY), token) {
            tracing::warn!("Invalid delete key provided for: {}", key);
            return Err(PasteError::InvalidDeleteKey);
        }
    }

    let keys = [raw.to_string(), html.to_string()];
    state
        .store
        .delete_objects(&keys)
        .await
        .map_err(|e| PasteError::storage("Failed to delete objects", e))?;

    metrics::record_paste_deleted();
    tracing::info!("Successfully deleted paste with key: {}", raw);
    Ok(())
}

fn required<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn delete_key_matches(stored: Option<&String>, presented: &str) -> bool {
    match stored {
        Some(stored) => stored.as_bytes().ct_eq(presented.as_bytes()).into(),
        None => false,
    }
}

/// 302 Found, optionally setting the history cookie.
fn found(location: &str, cookie: Option<HeaderValue>) -> Result<Response, PasteError> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| anyhow::anyhow!("invalid redirect location {location:?}: {e}"))?;
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::highlight::{HighlightError, Highlighter, SyntectHighlighter};
    use crate::server::app;
    use crate::storage::backend::{ObjectStore, StoreError, StoreFuture};
    use crate::storage::memory::MemoryStore;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::{TestResponse, TestServer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PREFIX: &str = "https://paste.example/";

    fn test_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();
        config.site.result_url_prefix = PREFIX.to_string();
        config.server.multipart_max_memory = 256 * 1024;
        config
    }

    fn server(store: Arc<dyn ObjectStore>, highlighter: Arc<dyn Highlighter>) -> TestServer {
        server_with_config(test_config(), store, highlighter)
    }

    fn server_with_config(
        config: Config,
        store: Arc<dyn ObjectStore>,
        highlighter: Arc<dyn Highlighter>,
    ) -> TestServer {
        let state = AppState::new(config, store, highlighter).unwrap();
        TestServer::new(app(Arc::new(state))).unwrap()
    }

    /// Counts calls and wraps the content length in a marker element.
    #[derive(Default)]
    struct CountingHighlighter {
        calls: AtomicUsize,
    }

    impl Highlighter for CountingHighlighter {
        fn highlight(
            &self,
            content: &str,
            syntax: &str,
            _style: &str,
        ) -> Result<String, HighlightError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!(
                r#"<div class="hl-{syntax}">{} bytes</div>"#,
                content.len()
            ))
        }

        fn has_style(&self, _style: &str) -> bool {
            true
        }

        fn languages(&self) -> Vec<String> {
            vec!["Python".to_string()]
        }
    }

    /// Wraps a [`MemoryStore`] and injects failures.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_uploads_ending_with: Option<&'static str>,
        fail_metadata: bool,
        partial_delete: bool,
    }

    impl ObjectStore for FlakyStore {
        fn upload_content<'a>(
            &'a self,
            key: &'a str,
            source: UploadSource,
            content_type: &'a str,
            metadata: &'a ObjectMetadata,
        ) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                if self
                    .fail_uploads_ending_with
                    .is_some_and(|suffix| key.ends_with(suffix))
                {
                    return Err(StoreError::Upload {
                        key: key.to_string(),
                        source: anyhow::anyhow!("injected upload failure"),
                    });
                }
                self.inner
                    .upload_content(key, source, content_type, metadata)
                    .await
            })
        }

        fn fetch_metadata<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMetadata> {
            Box::pin(async move {
                if self.fail_metadata {
                    return Err(StoreError::Metadata {
                        key: key.to_string(),
                        source: anyhow::anyhow!("injected metadata failure"),
                    });
                }
                self.inner.fetch_metadata(key).await
            })
        }

        fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                if self.partial_delete {
                    return Err(StoreError::PartialDelete {
                        failed: 1,
                        total: keys.len(),
                    });
                }
                self.inner.delete_objects(keys).await
            })
        }
    }

    fn location(response: &TestResponse) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .expect("location header")
            .to_str()
            .unwrap()
            .to_string()
    }

    /// `(raw, html)` keys of a text paste from its redirect location.
    fn text_keys(location: &str) -> (String, String) {
        let html = location.strip_prefix(PREFIX).unwrap().to_string();
        let raw = html.strip_suffix(".html").unwrap().to_string();
        (raw, html)
    }

    async fn post_text(server: &TestServer, content: &str) -> TestResponse {
        server
            .post("/")
            .multipart(MultipartForm::new().add_text("content", content.to_string()))
            .await
    }

    async fn delete_request(server: &TestServer, raw: &str, html: &str, key: &str) -> TestResponse {
        server
            .delete(&format!("/?raw={raw}&html={html}&key={key}"))
            .await
    }

    #[tokio::test]
    async fn test_get_index() {
        let server = server(
            Arc::new(MemoryStore::new()),
            Arc::new(CountingHighlighter::default()),
        );
        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.text();
        assert!(body.contains("<form"));
        assert!(body.contains(r#"<option value="Python">"#));
    }

    #[tokio::test]
    async fn test_text_paste_is_highlighted_and_stored() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(SyntectHighlighter::new()));

        let response = server
            .post("/")
            .multipart(
                MultipartForm::new()
                    .add_text("content", "print('hi')")
                    .add_text("syntax", "python"),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);

        let location = location(&response);
        let (raw, html) = text_keys(&location);
        assert!(uuid::Uuid::parse_str(&raw).is_ok());

        let raw_object = store.get(&raw).await.unwrap();
        assert_eq!(raw_object.data.as_ref(), b"print('hi')");
        assert!(raw_object.content_type.starts_with("text/plain"));

        let html_object = store.get(&html).await.unwrap();
        assert!(html_object.content_type.starts_with("text/html"));
        let page = String::from_utf8(html_object.data.to_vec()).unwrap();
        assert!(page.contains("<span"));
        assert!(page.contains("print"));

        let delete_key = &raw_object.metadata[DELETE_METADATA_KEY];
        assert_eq!(&html_object.metadata[DELETE_METADATA_KEY], delete_key);
        assert_ne!(delete_key, &raw);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let value = cookie
            .strip_prefix("paste_data=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        let history = PasteHistory::decode(value).unwrap();
        assert_eq!(history.objects.len(), 1);
        assert_eq!(history.objects[0].raw_key, raw);
        assert_eq!(history.objects[0].html_key, html);
        assert_eq!(&history.objects[0].delete_key, delete_key);
    }

    #[tokio::test]
    async fn test_highlight_cutoff() {
        let store = Arc::new(MemoryStore::new());
        let highlighter = Arc::new(CountingHighlighter::default());
        let server = server(store.clone(), highlighter.clone());

        let response = post_text(&server, &"a".repeat(MAX_HIGHLIGHT_BYTES)).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 1);

        let response = post_text(&server, &"a".repeat(MAX_HIGHLIGHT_BYTES + 1)).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 1);

        let (raw, html) = text_keys(&location(&response));
        let page = String::from_utf8(store.get(&html).await.unwrap().data.to_vec()).unwrap();
        assert!(page.contains("<pre>aaaa"));
        assert_eq!(
            store.get(&raw).await.unwrap().data.len(),
            MAX_HIGHLIGHT_BYTES + 1
        );
    }

    #[tokio::test]
    async fn test_empty_syntax_defaults_to_plaintext() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = server
            .post("/")
            .multipart(
                MultipartForm::new()
                    .add_text("content", "hello")
                    .add_text("syntax", ""),
            )
            .await;
        let (_, html) = text_keys(&location(&response));
        let page = String::from_utf8(store.get(&html).await.unwrap().data.to_vec()).unwrap();
        assert!(page.contains(r#"class="hl-plaintext""#));
    }

    #[tokio::test]
    async fn test_empty_form_redirects_to_index() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = post_text(&server, "").await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_form_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = server.post("/").text("not a multipart body").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_oversized_text_field_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.server.multipart_max_memory = 1024;
        let server = server_with_config(
            config,
            store.clone(),
            Arc::new(CountingHighlighter::default()),
        );

        let response = post_text(&server, &"a".repeat(200 * 1024)).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty().await);

        // The syntax field draws on the same budget as the content.
        let response = server
            .post("/")
            .multipart(
                MultipartForm::new()
                    .add_text("content", "a".repeat(1000))
                    .add_text("syntax", "x".repeat(100)),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty().await);

        let response = post_text(&server, &"a".repeat(1024)).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_file_upload_keeps_extension() {
        let store = Arc::new(MemoryStore::new());
        let highlighter = Arc::new(CountingHighlighter::default());
        let server = server(store.clone(), highlighter.clone());

        let part = Part::bytes(b"%PDF-1.4 fake".to_vec())
            .file_name("report.pdf")
            .mime_type("application/pdf");
        let response = server
            .post("/")
            .multipart(MultipartForm::new().add_part("file", part))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 0);

        let (stem, html) = text_keys(&location(&response));
        let raw = format!("{stem}.pdf");
        assert_eq!(store.keys().await, {
            let mut keys = vec![raw.clone(), html.clone()];
            keys.sort();
            keys
        });

        let raw_object = store.get(&raw).await.unwrap();
        assert_eq!(raw_object.content_type, "application/pdf");
        assert_eq!(raw_object.data.as_ref(), b"%PDF-1.4 fake");

        let page = String::from_utf8(store.get(&html).await.unwrap().data.to_vec()).unwrap();
        assert!(page.contains("report.pdf"));
        assert!(page.contains(">View</a>"));
    }

    #[tokio::test]
    async fn test_large_file_is_spooled() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        // Well past the 256 KiB in-memory cap of the test config.
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let part = Part::bytes(data.clone())
            .file_name("blob.bin")
            .mime_type("application/octet-stream");
        let response = server
            .post("/")
            .multipart(MultipartForm::new().add_part("file", part))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);

        let (stem, html) = text_keys(&location(&response));
        let raw_object = store.get(&format!("{stem}.bin")).await.unwrap();
        assert_eq!(raw_object.data.as_ref(), data.as_slice());

        let page = String::from_utf8(store.get(&html).await.unwrap().data.to_vec()).unwrap();
        assert!(!page.contains(">View</a>"));
        assert!(page.contains(">Download</a>"));
    }

    #[tokio::test]
    async fn test_history_cookie_appends() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let mut previous = PasteHistory::new();
        previous.push(PasteObject {
            html_key: "old.html".to_string(),
            raw_key: "old".to_string(),
            delete_key: "old-delete".to_string(),
        });
        let cookie = format!("paste_data={}", previous.encode().unwrap());

        let response = server
            .post("/")
            .add_header(
                header::COOKIE,
                HeaderValue::from_str(&cookie).unwrap(),
            )
            .multipart(MultipartForm::new().add_text("content", "second"))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let value = set_cookie
            .strip_prefix("paste_data=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        let history = PasteHistory::decode(value).unwrap();
        assert_eq!(history.objects.len(), 2);
        assert_eq!(history.objects[0].raw_key, "old");
        assert_eq!(history.create_time, previous.create_time);
    }

    #[tokio::test]
    async fn test_delete_with_valid_key() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = post_text(&server, "to be removed").await;
        let (raw, html) = text_keys(&location(&response));
        let delete_key = store.get(&raw).await.unwrap().metadata[DELETE_METADATA_KEY].clone();

        let response = delete_request(&server, &raw, &html, &delete_key).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_with_wrong_key_is_forbidden() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = post_text(&server, "keep me").await;
        let (raw, html) = text_keys(&location(&response));

        let response = delete_request(&server, &raw, &html, "not-the-key").await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert!(response.text().contains("Invalid delete key"));
        assert!(store.contains(&raw).await);
        assert!(store.contains(&html).await);
    }

    #[tokio::test]
    async fn test_delete_unknown_keys_is_ok() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = delete_request(&server, "missing", "missing.html", "whatever").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_missing_parameters() {
        let server = server(
            Arc::new(MemoryStore::new()),
            Arc::new(CountingHighlighter::default()),
        );

        let response = server.delete("/?raw=a&html=a.html").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server.delete("/?raw=a&html=&key=k").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let store = Arc::new(MemoryStore::new());
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = server.method(Method::PUT, "/").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.text().contains("not supported"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_page_upload_keeps_raw_object() {
        let store = Arc::new(FlakyStore {
            fail_uploads_ending_with: Some(".html"),
            ..Default::default()
        });
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = post_text(&server, "orphan").await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(response.text().contains("Failed to upload HTML content"));
        // No rollback: the raw object stays behind.
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_raw_upload_stores_nothing() {
        let store = Arc::new(FlakyStore {
            fail_uploads_ending_with: Some(".pdf"),
            ..Default::default()
        });
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let part = Part::bytes(b"data".to_vec())
            .file_name("report.pdf")
            .mime_type("application/pdf");
        let response = server
            .post("/")
            .multipart(MultipartForm::new().add_part("file", part))
            .await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_not_found() {
        let store = Arc::new(FlakyStore {
            fail_metadata: true,
            ..Default::default()
        });
        let server = server(store, Arc::new(CountingHighlighter::default()));

        let response = delete_request(&server, "a", "a.html", "k").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_partial_delete_is_server_error() {
        let store = Arc::new(FlakyStore {
            partial_delete: true,
            ..Default::default()
        });
        let server = server(store.clone(), Arc::new(CountingHighlighter::default()));

        let response = post_text(&server, "stubborn").await;
        let (raw, html) = text_keys(&location(&response));
        let delete_key = store.inner.get(&raw).await.unwrap().metadata[DELETE_METADATA_KEY].clone();

        let response = delete_request(&server, &raw, &html, &delete_key).await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("Failed to delete 1 of 2 objects"));
    }

    #[test]
    fn test_delete_key_matches() {
        let stored = "abc-123".to_string();
        assert!(delete_key_matches(Some(&stored), "abc-123"));
        assert!(!delete_key_matches(Some(&stored), "abc-124"));
        assert!(!delete_key_matches(Some(&stored), "abc"));
        assert!(!delete_key_matches(None, "abc-123"));
    }
}
