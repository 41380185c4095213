// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the modpilot binary.

pub mod output;
pub mod run_cmd;
pub mod status_cmd;
pub mod test_cmd;

use crate::acquisition::http_client::HttpClient;
use crate::acquisition::page_source::HttpPageSource;
use crate::completion::HttpCompletionApi;
use crate::config::{parse_candidates, EndpointConfig};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Connection options shared by every subcommand that talks to the course.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Course page URL.
    pub course_url: String,
    /// Session `Cookie:` header; falls back to `MODPILOT_COOKIE`.
    pub cookie: Option<String>,
    /// Override for the endpoint origin.
    pub base_url: Option<String>,
    /// Comma-separated position candidates.
    pub candidates: Option<String>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// HTTP collaborators built from [`SessionOptions`].
pub struct Session {
    pub endpoints: EndpointConfig,
    pub api: Arc<HttpCompletionApi>,
    pub source: Arc<HttpPageSource>,
}

impl SessionOptions {
    pub fn connect(&self) -> Result<Session> {
        let mut endpoints = EndpointConfig::new(&self.course_url)?.with_env();
        if let Some(base) = &self.base_url {
            endpoints = endpoints.with_base_url(base)?;
        }
        if let Some(cookie) = self.cookie.clone().filter(|c| !c.is_empty()) {
            endpoints.cookie = Some(cookie);
        }
        if let Some(raw) = &self.candidates {
            let candidates = parse_candidates(raw);
            if !candidates.is_empty() {
                endpoints.candidates = candidates;
            }
        }
        if let Some(ms) = self.timeout_ms {
            endpoints.request_timeout = Some(Duration::from_millis(ms));
        }

        let client = HttpClient::new(endpoints.request_timeout, endpoints.cookie.as_deref())?;
        let api = Arc::new(HttpCompletionApi::new(client.clone(), endpoints.clone()));
        let source = Arc::new(HttpPageSource::new(client, endpoints.course_url.as_str()));
        Ok(Session {
            endpoints,
            api,
            source,
        })
    }
}

/// Initialize tracing on stderr; JSON lines when `--json` is set.
pub fn init_tracing() {
    let default = if output::is_verbose() {
        "modpilot=debug"
    } else if output::is_quiet() {
        "modpilot=warn"
    } else {
        "modpilot=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if output::is_json() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("  Warning: logging already initialized: {e}");
    }
}
