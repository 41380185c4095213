// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Modpilot: sequential course-module completion driver.
//!
//! Reads a course page's module markers, walks the modules in order, and
//! drives the platform's progress endpoints for each one, then reconciles the
//! locally tracked completions against a fresh copy of the page.

pub mod acquisition;
pub mod cli;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod page;
pub mod processor;
pub mod progress;

pub use completion::{ApiResult, CompletionApi, HttpCompletionApi};
pub use config::{EndpointConfig, RunConfig};
pub use controller::{Controller, ProgressSnapshot, Reconciliation, RunReport, RunState};
pub use error::{CompletionError, RunError};
pub use page::{Category, CoursePage, ModuleRecord};
