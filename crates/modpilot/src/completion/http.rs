// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! reqwest-backed [`CompletionApi`].

use super::{ApiResult, CompletionApi, ProgressResponse, VERSION_NUMBER};
use crate::acquisition::http_client::HttpClient;
use crate::config::EndpointConfig;
use crate::error::CompletionError;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Talks to the course backend's progress endpoints.
pub struct HttpCompletionApi {
    client: HttpClient,
    endpoints: EndpointConfig,
}

impl HttpCompletionApi {
    pub fn new(client: HttpClient, endpoints: EndpointConfig) -> Self {
        Self { client, endpoints }
    }

    fn headers(&self, token: &str) -> Vec<(&'static str, String)> {
        vec![
            ("X-Requested-With", "XMLHttpRequest".to_string()),
            ("X-CSRF-Token", token.to_string()),
            (
                "Accept",
                "application/json, text/javascript, */*; q=0.01".to_string(),
            ),
            ("Origin", self.endpoints.origin()),
            ("Referer", self.endpoints.course_url.to_string()),
            ("Sec-Fetch-Dest", "empty".to_string()),
            ("Sec-Fetch-Mode", "cors".to_string()),
            ("Sec-Fetch-Site", "same-origin".to_string()),
        ]
    }
}

#[async_trait]
impl CompletionApi for HttpCompletionApi {
    async fn submit_stream_progress(
        &self,
        external_id: &str,
        token: Option<&str>,
        baseline: usize,
    ) -> ApiResult {
        let Some(token) = token else {
            warn!("no CSRF token found");
            return ApiResult::failed(CompletionError::MissingToken);
        };

        let url = self.endpoints.stream_progress_url();
        let headers = self.headers(token);
        let baseline = baseline as u64;

        for position in &self.endpoints.candidates {
            let fields = [
                ("course_data", external_id),
                ("duration_data", ""),
                ("position_data", position.as_str()),
                ("version_number", VERSION_NUMBER),
                ("_csrfToken", token),
            ];

            debug!("stream progress {external_id}: position_data={position}");
            let resp = match self.client.post_form(&url, &fields, &headers).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("network error on position_data={position}: {e:#}");
                    continue;
                }
            };
            debug!("response {}: {}", resp.status, resp.body);

            if !resp.is_success() {
                warn!(
                    "API failed (HTTP {}) on position_data={position}, trying next variant",
                    resp.status
                );
                continue;
            }

            match ProgressResponse::from_body(&resp.body) {
                ProgressResponse::Unparsed(_) => {
                    debug!("non-JSON success body, assuming progress changed");
                    return ApiResult::unparsed_success();
                }
                ProgressResponse::Parsed(payload) => {
                    let modules = payload.modules_completed.unwrap_or(baseline);
                    if modules > baseline {
                        info!("server modules increased to {modules} (position_data={position})");
                        return ApiResult::progressed(Some(modules), payload.progress);
                    }
                    debug!("progress unchanged at {modules}, trying next variant");
                }
            }
        }

        ApiResult::failed(CompletionError::AllVariantsExhausted)
    }

    async fn submit_single_progress(&self, external_id: &str, token: Option<&str>) -> ApiResult {
        let Some(token) = token else {
            warn!("no CSRF token found");
            return ApiResult::failed(CompletionError::MissingToken);
        };

        let url = self.endpoints.single_progress_url();
        let fields = [
            ("course_data", external_id),
            ("version_number", VERSION_NUMBER),
            ("_csrfToken", token),
        ];

        debug!("single progress {external_id}");
        let resp = match self.client.post_form(&url, &fields, &self.headers(token)).await {
            Ok(resp) => resp,
            Err(e) => return ApiResult::failed(CompletionError::Transport(format!("{e:#}"))),
        };
        debug!("response {}: {}", resp.status, resp.body);

        if !resp.is_success() {
            return ApiResult::failed(CompletionError::Http {
                status: resp.status,
            });
        }

        match ProgressResponse::from_body(&resp.body) {
            ProgressResponse::Parsed(payload) => {
                ApiResult::accepted(payload.modules_completed, payload.progress)
            }
            ProgressResponse::Unparsed(_) => ApiResult::accepted(None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer, candidates: &[&str]) -> HttpCompletionApi {
        api_at(&server.uri(), candidates)
    }

    fn api_at(base: &str, candidates: &[&str]) -> HttpCompletionApi {
        let mut endpoints = EndpointConfig::new(&format!("{base}/courses/view/9")).unwrap();
        endpoints.candidates = candidates.iter().map(|c| c.to_string()).collect();
        HttpCompletionApi::new(HttpClient::new(None, None).unwrap(), endpoints)
    }

    /// Answers every request with a 200 that announces a longer body than it
    /// sends, then closes the connection. Returns the base URL and a request counter.
    async fn truncating_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                              Content-Length: 1000\r\n\r\n{\"modules_completed\":",
                        )
                        .await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}"), requests)
    }

    /// Consume one request: headers plus `Content-Length` bytes of body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_stream_stops_on_first_increase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/courses/update-media-progress"))
            .and(body_string_contains("position_data=A"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"modules_completed":3}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/courses/update-media-progress"))
            .and(body_string_contains("position_data=B"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"modules_completed":4,"progress":50}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("position_data=C"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"modules_completed":9}"#))
            .expect(0)
            .mount(&server)
            .await;

        let api = api_for(&server, &["A", "B", "C"]).await;
        let result = api.submit_stream_progress("vid-1", Some("tok"), 3).await;

        assert!(result.success);
        assert!(result.progress_changed);
        assert_eq!(result.modules_completed, Some(4));
        assert_eq!(result.progress_level, Some(50.0));
    }

    #[tokio::test]
    async fn test_stream_sends_expected_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/courses/update-media-progress"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("x-csrf-token", "tok-1"))
            .and(body_string_contains("course_data=vid-7"))
            .and(body_string_contains("duration_data=&"))
            .and(body_string_contains("version_number=3"))
            .and(body_string_contains("_csrfToken=tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, &["300", "594", "99999"]).await;
        let result = api.submit_stream_progress("vid-7", Some("tok-1"), 0).await;

        // Non-JSON success is taken as acceptance on the first candidate.
        assert!(result.success);
        assert!(result.progress_changed);
        assert_eq!(result.modules_completed, None);
    }

    #[tokio::test]
    async fn test_stream_exhausts_all_variants() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("position_data=1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("position_data=2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"progress":10}"#))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, &["1", "2"]).await;
        let result = api.submit_stream_progress("vid-2", Some("tok"), 2).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(CompletionError::AllVariantsExhausted));
    }

    #[tokio::test]
    async fn test_stream_missing_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let api = api_for(&server, &["300"]).await;
        let result = api.submit_stream_progress("vid-3", None, 0).await;
        assert_eq!(result.error, Some(CompletionError::MissingToken));
    }

    #[tokio::test]
    async fn test_stream_transport_failure_advances() {
        // Nothing listens on the reserved port, so every candidate fails to connect.
        let mut endpoints = EndpointConfig::new("http://127.0.0.1:9/course").unwrap();
        endpoints.candidates = vec!["a".to_string(), "b".to_string()];
        let api = HttpCompletionApi::new(HttpClient::new(None, None).unwrap(), endpoints);

        let result = api.submit_stream_progress("vid-4", Some("tok"), 0).await;
        assert_eq!(result.error, Some(CompletionError::AllVariantsExhausted));
    }

    #[tokio::test]
    async fn test_stream_truncated_body_advances() {
        let (base, requests) = truncating_server().await;
        let api = api_at(&base, &["A", "B", "C"]);

        let result = api.submit_stream_progress("vid-5", Some("tok"), 3).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(CompletionError::AllVariantsExhausted));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_truncated_body_is_transport_error() {
        let (base, _) = truncating_server().await;
        let api = api_at(&base, &[]);

        let result = api.submit_single_progress("pdf-5", Some("tok")).await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(CompletionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_single_progress_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/courses/update-single-progress"))
            .and(body_string_contains("course_data=pdf-1"))
            .and(body_string_contains("version_number=3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"modules_completed":6,"progress":75}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, &[]).await;
        let result = api.submit_single_progress("pdf-1", Some("tok")).await;
        assert!(result.success);
        assert_eq!(result.modules_completed, Some(6));
        assert_eq!(result.progress_level, Some(75.0));
    }

    #[tokio::test]
    async fn test_single_progress_is_lenient() {
        // Success by status alone, even though the body reports no progress.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>saved</html>"))
            .mount(&server)
            .await;

        let api = api_for(&server, &[]).await;
        let result = api.submit_single_progress("html-1", Some("tok")).await;
        assert!(result.success);
        assert!(!result.progress_changed);
        assert_eq!(result.modules_completed, None);
    }

    #[tokio::test]
    async fn test_single_progress_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(419))
            .mount(&server)
            .await;

        let api = api_for(&server, &[]).await;
        let result = api.submit_single_progress("html-2", Some("tok")).await;
        assert_eq!(result.error, Some(CompletionError::Http { status: 419 }));
    }

    #[tokio::test]
    async fn test_single_progress_missing_token() {
        let server = MockServer::start().await;
        let api = api_for(&server, &[]).await;
        let result = api.submit_single_progress("html-3", None).await;
        assert_eq!(result.error, Some(CompletionError::MissingToken));
    }
}
