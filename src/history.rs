//! Client-side paste history cookie.
//!
//! The `paste_data` cookie holds base64-encoded JSON listing the keys of
//! pastes created from this browser, so the landing page script can
//! offer links and delete buttons.  It is UI state only: deletion is
//! always authorized against the metadata stored with the objects.

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::PasteKeys;

/// Cookie name.
pub const COOKIE_NAME: &str = "paste_data";

/// Cookie lifetime: 365 days.
pub const COOKIE_MAX_AGE_SECS: u64 = 86_400 * 365;

/// Most entries kept; older ones are dropped to stay under browser
/// cookie size limits.
pub const MAX_ENTRIES: usize = 16;

/// Keys of one paste as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteObject {
    #[serde(rename = "htmlKey")]
    pub html_key: String,
    #[serde(rename = "rawKey")]
    pub raw_key: String,
    #[serde(rename = "deleteKey")]
    pub delete_key: String,
}

impl From<&PasteKeys> for PasteObject {
    fn from(keys: &PasteKeys) -> Self {
        Self {
            html_key: keys.html.clone(),
            raw_key: keys.raw.clone(),
            delete_key: keys.delete.clone(),
        }
    }
}

/// Decoded cookie contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasteHistory {
    pub objects: Vec<PasteObject>,
    pub create_time: DateTime<Utc>,
}

impl PasteHistory {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            create_time: Utc::now(),
        }
    }

    /// Read the history from a request's `Cookie` headers.
    ///
    /// A missing or unreadable cookie yields `None`; the client simply
    /// starts a fresh history.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = cookie_value(headers, COOKIE_NAME)?;
        match Self::decode(value) {
            Ok(history) => Some(history),
            Err(e) => {
                tracing::debug!("Ignoring unreadable {} cookie: {}", COOKIE_NAME, e);
                None
            }
        }
    }

    /// Append a paste, dropping the oldest entries beyond [`MAX_ENTRIES`].
    pub fn push(&mut self, object: PasteObject) {
        self.objects.push(object);
        if self.objects.len() > MAX_ENTRIES {
            let excess = self.objects.len() - MAX_ENTRIES;
            self.objects.drain(..excess);
        }
    }

    /// Serialize to base64(JSON).
    pub fn encode(&self) -> anyhow::Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Parse a base64(JSON) cookie value.
    pub fn decode(value: &str) -> anyhow::Result<Self> {
        let json = STANDARD.decode(value.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Build the `Set-Cookie` header value for this history.
    pub fn set_cookie_header(&self) -> anyhow::Result<HeaderValue> {
        let cookie = format!(
            "{COOKIE_NAME}={}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; Secure; SameSite=Lax",
            self.encode()?
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }
}

impl Default for PasteHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a cookie by name across all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}
