// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP acquisition: the shared client and the course-page source.

pub mod http_client;
pub mod page_source;
