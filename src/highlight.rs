//! Syntax highlighting.
//!
//! The controller only sees the [`Highlighter`] trait: content, a
//! language hint and a style name go in, an HTML fragment comes out.
//! [`SyntectHighlighter`] is the production implementation backed by
//! syntect's bundled grammars and themes.

use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use thiserror::Error;

/// Language hint used when the form does not carry one.
pub const DEFAULT_SYNTAX: &str = "plaintext";

/// Highlighting failures.  Each one is fatal for the request.
#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("unknown syntax: {0}")]
    UnknownSyntax(String),

    #[error("unknown style: {0}")]
    UnknownStyle(String),

    #[error("highlighting failed: {0}")]
    Render(#[from] syntect::Error),
}

/// Renders source text as highlighted HTML markup.
pub trait Highlighter: Send + Sync + 'static {
    /// Highlight `content` as `syntax` using the theme `style`.
    fn highlight(&self, content: &str, syntax: &str, style: &str) -> Result<String, HighlightError>;

    /// Whether `style` names a known theme.
    fn has_style(&self, style: &str) -> bool;

    /// Language names offered on the landing page.
    fn languages(&self) -> Vec<String>;
}

/// Highlighter backed by syntect's default syntax and theme sets.
pub struct SyntectHighlighter {
    syntaxes: SyntaxSet,
    themes: ThemeSet,
}

impl SyntectHighlighter {
    pub fn new() -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            themes: ThemeSet::load_defaults(),
        }
    }

    fn theme(&self, style: &str) -> Result<&Theme, HighlightError> {
        self.themes
            .themes
            .get(style)
            .ok_or_else(|| HighlightError::UnknownStyle(style.to_string()))
    }

    fn resolve_syntax(&self, hint: &str) -> Result<&SyntaxReference, HighlightError> {
        let trimmed = hint.trim();
        if is_plain_text(trimmed) {
            return Ok(self.syntaxes.find_syntax_plain_text());
        }
        find_syntax(&self.syntaxes, trimmed)
            .ok_or_else(|| HighlightError::UnknownSyntax(trimmed.to_string()))
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, content: &str, syntax: &str, style: &str) -> Result<String, HighlightError> {
        let theme = self.theme(style)?;
        let syntax = self.resolve_syntax(syntax)?;
        let html =
            syntect::html::highlighted_html_for_string(content, &self.syntaxes, syntax, theme)?;
        Ok(html)
    }

    fn has_style(&self, style: &str) -> bool {
        self.themes.themes.contains_key(style)
    }

    fn languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .syntaxes
            .syntaxes()
            .iter()
            .map(|syntax| syntax.name.clone())
            .collect();
        names.sort_by_key(|name| name.to_ascii_lowercase());
        names.dedup();
        names
    }
}

fn is_plain_text(hint: &str) -> bool {
    hint.is_empty()
        || matches!(
            hint.to_ascii_lowercase().as_str(),
            "plaintext" | "plain text" | "plain" | "text" | "txt"
        )
}

fn normalized_syntax_key(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Look a hint up by exact name, extension, then case-insensitive and
/// punctuation-insensitive name.
fn find_syntax<'a>(ps: &'a SyntaxSet, hint: &str) -> Option<&'a SyntaxReference> {
    if let Some(syntax) = ps.find_syntax_by_name(hint) {
        return Some(syntax);
    }
    if let Some(syntax) = ps.find_syntax_by_extension(hint) {
        return Some(syntax);
    }

    if let Some(syntax) = ps
        .syntaxes()
        .iter()
        .find(|syntax| syntax.name.eq_ignore_ascii_case(hint))
    {
        return Some(syntax);
    }

    let normalized = normalized_syntax_key(hint);
    if !normalized.is_empty() {
        if let Some(syntax) = ps
            .syntaxes()
            .iter()
            .find(|syntax| normalized_syntax_key(&syntax.name) == normalized)
        {
            return Some(syntax);
        }
    }

    ps.syntaxes().iter().find(|syntax| {
        syntax
            .file_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(hint))
    })
}
