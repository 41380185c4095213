// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run and endpoint configuration.
//!
//! Defaults are overlaid by `MODPILOT_*` environment variables; the CLI then
//! overrides individual fields from its flags.

use crate::error::RunError;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

const DEFAULT_DELAY_MS: u64 = 2000;
const DEFAULT_UNLOCK_DELAY_MS: u64 = 500;
const DEFAULT_COMPLETE_DELAY_MS: u64 = 1000;
const DEFAULT_RECONCILE_DELAY_MS: u64 = 1000;
const DEFAULT_RELOAD_DELAY_MS: u64 = 2000;

/// Position values tried in order against the multi-step endpoint.
pub const DEFAULT_CANDIDATES: [&str; 3] = ["300", "594", "99999"];

/// Path of the multi-step (media) progress endpoint.
pub const STREAM_PROGRESS_PATH: &str = "/courses/update-media-progress";
/// Path of the single-step progress endpoint.
pub const SINGLE_PROGRESS_PATH: &str = "/courses/update-single-progress";

/// Pacing and skip settings for the run controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Module indices never handed to the API client.
    pub skip_list: BTreeSet<usize>,
    /// Pause after every module attempt.
    pub inter_module_delay: Duration,
    /// Pause after unlocking a locked module, before calling the API.
    pub unlock_delay: Duration,
    /// Pause after a module is marked complete.
    pub complete_delay: Duration,
    /// Pause before fetching the fresh page for reconciliation.
    pub reconcile_delay: Duration,
    /// Delay before a scheduled reload replaces the local page.
    pub reload_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            skip_list: BTreeSet::new(),
            inter_module_delay: Duration::from_millis(DEFAULT_DELAY_MS),
            unlock_delay: Duration::from_millis(DEFAULT_UNLOCK_DELAY_MS),
            complete_delay: Duration::from_millis(DEFAULT_COMPLETE_DELAY_MS),
            reconcile_delay: Duration::from_millis(DEFAULT_RECONCILE_DELAY_MS),
            reload_delay: Duration::from_millis(DEFAULT_RELOAD_DELAY_MS),
        }
    }
}

impl RunConfig {
    /// Defaults overlaid with `MODPILOT_*` environment variables.
    pub fn from_env() -> Result<Self, RunError> {
        let defaults = Self::default();
        let skip_list = match read_env_string("MODPILOT_SKIP") {
            Some(raw) => parse_index_list(&raw)?,
            None => defaults.skip_list,
        };
        Ok(Self {
            skip_list,
            inter_module_delay: read_env_ms("MODPILOT_DELAY_MS", defaults.inter_module_delay),
            unlock_delay: read_env_ms("MODPILOT_UNLOCK_DELAY_MS", defaults.unlock_delay),
            complete_delay: read_env_ms("MODPILOT_COMPLETE_DELAY_MS", defaults.complete_delay),
            reconcile_delay: read_env_ms("MODPILOT_RECONCILE_DELAY_MS", defaults.reconcile_delay),
            reload_delay: read_env_ms("MODPILOT_RELOAD_DELAY_MS", defaults.reload_delay),
        })
    }

    /// Same settings with every pause set to zero.
    pub fn without_delays(mut self) -> Self {
        self.inter_module_delay = Duration::ZERO;
        self.unlock_delay = Duration::ZERO;
        self.complete_delay = Duration::ZERO;
        self.reconcile_delay = Duration::ZERO;
        self.reload_delay = Duration::ZERO;
        self
    }

    pub fn with_skip_list(mut self, skip: impl IntoIterator<Item = usize>) -> Self {
        self.skip_list = skip.into_iter().collect();
        self
    }
}

/// Where the course page and progress endpoints live.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// The course page; also sent as `Referer`.
    pub course_url: Url,
    /// Origin the progress endpoints are resolved against.
    pub base_url: Url,
    /// Session `Cookie:` header for an already-authenticated session.
    pub cookie: Option<String>,
    /// Position values for the multi-step endpoint, tried in order.
    pub candidates: Vec<String>,
    /// Per-request timeout; `None` leaves it to the network stack.
    pub request_timeout: Option<Duration>,
}

impl EndpointConfig {
    /// Build from a course URL, deriving the base from its origin.
    pub fn new(course_url: &str) -> Result<Self, RunError> {
        let course_url = Url::parse(course_url)
            .map_err(|e| RunError::Config(format!("course url '{course_url}': {e}")))?;
        let base_url = origin_of(&course_url)?;
        Ok(Self {
            course_url,
            base_url,
            cookie: None,
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            request_timeout: None,
        })
    }

    /// Overlay `MODPILOT_COOKIE`, `MODPILOT_CANDIDATES` and `MODPILOT_TIMEOUT_MS`.
    pub fn with_env(mut self) -> Self {
        if let Some(cookie) = read_env_string("MODPILOT_COOKIE").filter(|c| !c.is_empty()) {
            self.cookie = Some(cookie);
        }
        if let Some(raw) = read_env_string("MODPILOT_CANDIDATES") {
            let candidates = parse_candidates(&raw);
            if !candidates.is_empty() {
                self.candidates = candidates;
            }
        }
        if let Some(ms) = read_env_u64("MODPILOT_TIMEOUT_MS") {
            self.request_timeout = Some(Duration::from_millis(ms));
        }
        self
    }

    /// Replace the endpoint base.
    pub fn with_base_url(mut self, base: &str) -> Result<Self, RunError> {
        self.base_url =
            Url::parse(base).map_err(|e| RunError::Config(format!("base url '{base}': {e}")))?;
        Ok(self)
    }

    pub fn stream_progress_url(&self) -> String {
        self.endpoint(STREAM_PROGRESS_PATH)
    }

    pub fn single_progress_url(&self) -> String {
        self.endpoint(SINGLE_PROGRESS_PATH)
    }

    /// The base without a trailing slash, as sent in the `Origin` header.
    pub fn origin(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.origin())
    }
}

fn origin_of(url: &Url) -> Result<Url, RunError> {
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(RunError::Config(format!("course url '{url}' has no origin")));
    }
    Url::parse(&origin.ascii_serialization())
        .map_err(|e| RunError::Config(format!("origin of '{url}': {e}")))
}

/// Parse a comma- or space-separated list of module indices.
pub fn parse_index_list(raw: &str) -> Result<BTreeSet<usize>, RunError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| RunError::Config(format!("invalid module index '{s}'")))
        })
        .collect()
}

/// Parse a comma-separated candidate list, dropping blanks.
pub fn parse_candidates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn read_env_ms(name: &str, default_value: Duration) -> Duration {
    read_env_u64(name)
        .map(Duration::from_millis)
        .unwrap_or(default_value)
}

fn read_env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pacing() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.inter_module_delay, Duration::from_secs(2));
        assert_eq!(cfg.unlock_delay, Duration::from_millis(500));
        assert!(cfg.skip_list.is_empty());

        let fast = cfg.without_delays();
        assert_eq!(fast.inter_module_delay, Duration::ZERO);
        assert_eq!(fast.reload_delay, Duration::ZERO);
    }

    #[test]
    fn test_endpoint_urls_from_course_origin() {
        let cfg = EndpointConfig::new("https://vle.example.edu/courses/view/42?tab=1").unwrap();
        assert_eq!(cfg.origin(), "https://vle.example.edu");
        assert_eq!(
            cfg.stream_progress_url(),
            "https://vle.example.edu/courses/update-media-progress"
        );
        assert_eq!(
            cfg.single_progress_url(),
            "https://vle.example.edu/courses/update-single-progress"
        );
        assert_eq!(cfg.candidates, vec!["300", "594", "99999"]);
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn test_base_url_override() {
        let cfg = EndpointConfig::new("https://vle.example.edu/c/1")
            .unwrap()
            .with_base_url("http://127.0.0.1:8080/")
            .unwrap();
        assert_eq!(
            cfg.single_progress_url(),
            "http://127.0.0.1:8080/courses/update-single-progress"
        );
    }

    #[test]
    fn test_invalid_course_url() {
        assert!(matches!(
            EndpointConfig::new("not a url"),
            Err(RunError::Config(_))
        ));
    }

    #[test]
    fn test_parse_index_list() {
        let parsed = parse_index_list("3, 5 7,,").unwrap();
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![3, 5, 7]);
        assert!(parse_index_list("2,x").is_err());
        assert!(parse_index_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_candidates() {
        assert_eq!(parse_candidates(" 10, ,20 "), vec!["10", "20"]);
    }
}
