// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Where course-page HTML comes from.

use super::http_client::HttpClient;
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Source of the current course-page document.
///
/// Used for the initial load and for the fresh copy fetched during
/// reconciliation.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page's raw HTML.
    async fn fetch_page(&self) -> Result<String>;
}

/// Fetches the course page over HTTP with the session cookie.
pub struct HttpPageSource {
    client: HttpClient,
    url: String,
}

impl HttpPageSource {
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self) -> Result<String> {
        let resp = self.client.get(&self.url).await?;
        if !resp.is_success() {
            bail!("GET {} returned HTTP {}", self.url, resp.status);
        }
        tracing::debug!(
            "fetched course page {} ({} bytes)",
            resp.final_url,
            resp.body.len()
        );
        Ok(resp.body)
    }
}
