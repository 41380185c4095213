// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for module completion and run control.

use serde::Serialize;

/// Why a single module could not be completed.
///
/// None of these are fatal to a run; the controller logs them and moves on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
pub enum CompletionError {
    #[error("no CSRF token available")]
    MissingToken,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("module {0} not found")]
    ModuleNotFound(usize),

    #[error("module {0} has no data-id")]
    MissingExternalId(usize),

    #[error("all position_data variants failed")]
    AllVariantsExhausted,
}

/// Errors that prevent a run from starting.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("already running")]
    AlreadyRunning,

    #[error("no modules found on the course page")]
    NoModules,

    #[error("failed to fetch course page: {0}")]
    PageFetch(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type RunResult<T> = Result<T, RunError>;
