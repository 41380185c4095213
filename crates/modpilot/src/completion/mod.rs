// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Completion API: the two backend progress calls and their results.
//!
//! Two protocols exist, selected by module category:
//!
//! - **stream progress** (video): several position candidates are submitted in
//!   order until the server-reported `modules_completed` rises above the
//!   baseline observed at the start of the call.
//! - **single progress** (html/pdf): one request, success inferred from the
//!   HTTP status alone.
//!
//! The single-progress protocol reports success even when the server count
//! did not move. That leniency is kept on purpose and is covered by tests.

pub mod http;

use crate::error::CompletionError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use http::HttpCompletionApi;

/// Value of the `version_number` form field on both endpoints.
pub const VERSION_NUMBER: &str = "3";

/// Normalized outcome of one API operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResult {
    pub success: bool,
    pub progress_changed: bool,
    pub modules_completed: Option<u64>,
    pub progress_level: Option<f64>,
    pub error: Option<CompletionError>,
}

impl ApiResult {
    /// The server count rose above the baseline.
    pub fn progressed(modules_completed: Option<u64>, progress_level: Option<f64>) -> Self {
        Self {
            success: true,
            progress_changed: true,
            modules_completed,
            progress_level,
            error: None,
        }
    }

    /// Accepted by HTTP status, with whatever counts the body carried.
    pub fn accepted(modules_completed: Option<u64>, progress_level: Option<f64>) -> Self {
        Self {
            success: true,
            progress_changed: false,
            modules_completed,
            progress_level,
            error: None,
        }
    }

    /// A 2xx body that was not JSON; taken as acceptance with progress.
    pub fn unparsed_success() -> Self {
        Self::progressed(None, None)
    }

    pub fn failed(error: CompletionError) -> Self {
        Self {
            success: false,
            progress_changed: false,
            modules_completed: None,
            progress_level: None,
            error: Some(error),
        }
    }
}

/// Counts reported by a structured response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPayload {
    pub modules_completed: Option<u64>,
    pub progress: Option<f64>,
}

/// A response body, narrowed once.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressResponse {
    Parsed(ProgressPayload),
    Unparsed(String),
}

impl ProgressResponse {
    /// Parse a body. Any valid JSON is `Parsed`; fields that are missing or
    /// of an unusable type come back as `None`.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::Parsed(ProgressPayload {
                modules_completed: value.get("modules_completed").and_then(as_count),
                progress: value.get("progress").and_then(as_level),
            }),
            Err(_) => Self::Unparsed(body.to_string()),
        }
    }
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_level(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Backend progress calls.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Multi-step progress for streaming content.
    ///
    /// `baseline` is the completed-module count known when the call starts;
    /// only a server count above it ends the candidate loop with success.
    async fn submit_stream_progress(
        &self,
        external_id: &str,
        token: Option<&str>,
        baseline: usize,
    ) -> ApiResult;

    /// Single-step progress for static content.
    async fn submit_single_progress(&self, external_id: &str, token: Option<&str>) -> ApiResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_body() {
        let parsed = ProgressResponse::from_body(r#"{"modules_completed": 5, "progress": 62.5}"#);
        assert_eq!(
            parsed,
            ProgressResponse::Parsed(ProgressPayload {
                modules_completed: Some(5),
                progress: Some(62.5),
            })
        );
    }

    #[test]
    fn test_parse_string_counts() {
        let parsed = ProgressResponse::from_body(r#"{"modules_completed": "7", "progress": "80"}"#);
        match parsed {
            ProgressResponse::Parsed(p) => {
                assert_eq!(p.modules_completed, Some(7));
                assert_eq!(p.progress, Some(80.0));
            }
            other => panic!("expected parsed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_without_fields() {
        assert_eq!(
            ProgressResponse::from_body(r#"{"status":"ok"}"#),
            ProgressResponse::Parsed(ProgressPayload::default())
        );
        assert_eq!(
            ProgressResponse::from_body("true"),
            ProgressResponse::Parsed(ProgressPayload::default())
        );
    }

    #[test]
    fn test_unparsed_body() {
        assert_eq!(
            ProgressResponse::from_body("OK"),
            ProgressResponse::Unparsed("OK".to_string())
        );
        assert!(matches!(
            ProgressResponse::from_body(""),
            ProgressResponse::Unparsed(_)
        ));
    }

    #[test]
    fn test_result_constructors() {
        let ok = ApiResult::unparsed_success();
        assert!(ok.success && ok.progress_changed);

        let lenient = ApiResult::accepted(Some(2), None);
        assert!(lenient.success && !lenient.progress_changed);

        let failed = ApiResult::failed(CompletionError::MissingToken);
        assert!(!failed.success);
        assert_eq!(failed.error, Some(CompletionError::MissingToken));
    }
}
