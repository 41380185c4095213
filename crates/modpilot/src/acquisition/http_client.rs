// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client wrapping reqwest.
//!
//! Carries the operator's session cookie on every request. Page GETs retry on
//! 5xx and back off on 429; form POSTs are sent exactly once.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::time::Duration;

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client shared by the page source and the completion API.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with a desktop browser user-agent.
    ///
    /// `timeout` of `None` leaves request timing to the network stack.
    pub fn new(timeout: Option<Duration>, cookie: Option<&str>) -> Result<Self> {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            let mut value =
                HeaderValue::from_str(cookie).context("session cookie is not a valid header")?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// GET a page with retry on 5xx and backoff on 429.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let mut retries = 0u32;
        let max_retries = 2;

        loop {
            match self.client.get(url).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::debug!("GET {url} returned {status}, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        let delay = Duration::from_secs(retry_after.min(10));
                        tracing::debug!("GET {url} rate limited, backing off {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return read_response(url, r).await;
                }
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::debug!("GET {url} failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e).with_context(|| format!("GET {url}"));
                }
            }
        }
    }

    /// POST url-encoded form fields with extra headers. Never retried.
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(&str, &str)],
        extra_headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        // .form() keeps an already-set Content-Type, so the charset variant survives.
        let mut builder = self.client.post(url).header(
            reqwest::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8",
        );

        for (name, value) in extra_headers {
            builder = builder.header(*name, value.as_str());
        }

        builder = builder.form(form_fields);

        let r = builder
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        read_response(url, r).await
    }
}

async fn read_response(url: &str, r: reqwest::Response) -> Result<HttpResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let body = r
        .text()
        .await
        .with_context(|| format!("reading body of {url}"))?;

    Ok(HttpResponse {
        final_url,
        status,
        body,
    })
}
