//! Paste key generation.
//!
//! Every submission gets a fresh [`PasteKeys`] triple: the raw object
//! key, the rendered page key and the delete capability.  The raw key
//! and the delete key are independent random UUIDs; the page key is
//! derived from the raw key.

use uuid::Uuid;

/// Suffix of the rendered page key.
pub const HTML_SUFFIX: &str = ".html";

/// Longest file extension carried over into a raw key.
const MAX_EXTENSION_LEN: usize = 16;

/// Keys issued for one paste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteKeys {
    /// Key of the raw object, `<uuid>[.<ext>]`.
    pub raw: String,
    /// Key of the rendered page, `<uuid>.html`.
    pub html: String,
    /// Delete capability stored as object metadata.
    pub delete: String,
}

impl PasteKeys {
    /// Draw a new key triple.
    pub fn generate() -> Self {
        let id = Uuid::new_v4().to_string();
        let html = format!("{id}{HTML_SUFFIX}");
        Self {
            raw: id,
            html,
            delete: Uuid::new_v4().to_string(),
        }
    }

    /// Append the extension of `file_name` (if any) to the raw key.
    ///
    /// The page key is left alone: it is always derived from the bare id.
    pub fn with_file_extension(mut self, file_name: &str) -> Self {
        if let Some(ext) = file_extension(file_name) {
            self.raw.push('.');
            self.raw.push_str(&ext);
        }
        self
    }
}

/// Extension of an uploaded file name, without the dot.
///
/// Only the last path component is considered.  Extensions longer
/// than 16 characters or containing anything but ASCII alphanumerics,
/// `_` and `-` are dropped, keeping object keys URL-safe.
pub fn file_extension(file_name: &str) -> Option<String> {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some(ext.to_string())
}
