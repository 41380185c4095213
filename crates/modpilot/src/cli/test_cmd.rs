// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! `modpilot test-module`: submit stream progress for a single module.

use crate::cli::output;
use crate::cli::SessionOptions;
use crate::config::RunConfig;
use crate::controller::Controller;
use anyhow::{Context, Result};

pub async fn run(session: &SessionOptions, index: usize) -> Result<()> {
    let connected = session.connect()?;
    let cookie = connected.endpoints.cookie.clone();
    let controller = Controller::load(
        connected.api,
        connected.source,
        RunConfig::from_env()?,
        cookie,
    )
    .await
    .context("failed to load course page")?;

    let result = controller.test_module(index).await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&result)?);
    } else if !output::is_quiet() {
        match &result.error {
            None => println!(
                "  ✓ module {index}: accepted (modules={:?}, progress={:?})",
                result.modules_completed, result.progress_level
            ),
            Some(e) => println!("  ✗ module {index}: {e}"),
        }
    }
    Ok(())
}
