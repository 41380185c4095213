// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Security (CSRF) token lookup.
//!
//! Sources are checked in fixed priority order:
//! 1. `<meta name="csrfToken">` / `<meta name="_token">` (`content` attribute)
//! 2. hidden form field `<input name="_token">` (`value` attribute)
//! 3. the `csrfToken` cookie of the operator-supplied session cookie header

use super::CoursePage;
use scraper::{Html, Selector};

/// Name of the cookie carrying the token.
pub const TOKEN_COOKIE: &str = "csrfToken";

/// Where a token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Meta,
    FormField,
    Cookie,
}

/// A resolved security token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    pub value: String,
    pub source: TokenSource,
}

impl SecurityToken {
    /// Resolve the token for a page, falling back to the session cookie.
    pub fn resolve(page: &CoursePage, cookie_header: Option<&str>) -> Option<Self> {
        let (meta, field) = page.document_tokens();
        if let Some(value) = meta {
            return Some(Self::new(value, TokenSource::Meta));
        }
        if let Some(value) = field {
            return Some(Self::new(value, TokenSource::FormField));
        }
        cookie_header
            .and_then(|header| cookie_value(header, TOKEN_COOKIE))
            .map(|value| Self::new(&value, TokenSource::Cookie))
    }

    fn new(value: &str, source: TokenSource) -> Self {
        Self {
            value: value.to_string(),
            source,
        }
    }

    /// Short prefix safe to write to logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.value.chars().take(8).collect();
        format!("{prefix}…")
    }
}

/// Scan a parsed document for the metadata and hidden-field tokens.
pub(super) fn scan_document(document: &Html) -> (Option<String>, Option<String>) {
    let meta = ["meta[name=\"csrfToken\"]", "meta[name=\"_token\"]"]
        .iter()
        .find_map(|css| first_attr(document, css, "content"));
    let field = first_attr(document, "input[name=\"_token\"]", "value");
    (meta, field)
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// Extract a cookie value from a `Cookie:` header string.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name && !value.is_empty()).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_token_wins() {
        let page = CoursePage::parse(
            r#"<head><meta name="_token" content="from-meta"></head>
               <form><input type="hidden" name="_token" value="from-field"></form>"#,
        );
        let token = SecurityToken::resolve(&page, Some("csrfToken=from-cookie")).unwrap();
        assert_eq!(token.value, "from-meta");
        assert_eq!(token.source, TokenSource::Meta);
    }

    #[test]
    fn test_form_field_before_cookie() {
        let page = CoursePage::parse(
            r#"<form><input type="hidden" name="_token" value="from-field"></form>"#,
        );
        let token = SecurityToken::resolve(&page, Some("csrfToken=from-cookie")).unwrap();
        assert_eq!(token.value, "from-field");
        assert_eq!(token.source, TokenSource::FormField);
    }

    #[test]
    fn test_cookie_fallback() {
        let page = CoursePage::parse("<body></body>");
        let token =
            SecurityToken::resolve(&page, Some("PHPSESSID=abc; csrfToken=c0ffee==; x=1")).unwrap();
        assert_eq!(token.value, "c0ffee==");
        assert_eq!(token.source, TokenSource::Cookie);
    }

    #[test]
    fn test_no_token() {
        let page = CoursePage::parse(r#"<meta name="csrfToken" content="  ">"#);
        assert!(SecurityToken::resolve(&page, None).is_none());
        assert!(SecurityToken::resolve(&page, Some("session=1")).is_none());
    }

    #[test]
    fn test_redacted_prefix() {
        let token = SecurityToken::new("abcdefghijklmnop", TokenSource::Meta);
        assert_eq!(token.redacted(), "abcdefgh…");
    }
}
