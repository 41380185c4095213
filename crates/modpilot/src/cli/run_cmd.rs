// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! `modpilot run`: complete every module on a course page.

use crate::cli::output::{self, yes_no};
use crate::cli::SessionOptions;
use crate::config::{parse_index_list, RunConfig};
use crate::controller::{Controller, RunReport};
use crate::progress::{RunEventKind, RunEventReceiver};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

/// Flags specific to `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Comma-separated module indices to skip.
    pub skip: Option<String>,
    /// Inter-module delay override in milliseconds.
    pub delay_ms: Option<u64>,
}

pub async fn run(session: &SessionOptions, options: &RunOptions) -> Result<()> {
    let mut config = RunConfig::from_env()?;
    if let Some(raw) = &options.skip {
        config.skip_list = parse_index_list(raw)?;
    }
    if let Some(ms) = options.delay_ms {
        config.inter_module_delay = Duration::from_millis(ms);
    }

    let connected = session.connect()?;
    let cookie = connected.endpoints.cookie.clone();
    let controller = Arc::new(
        Controller::load(connected.api, connected.source, config, cookie)
            .await
            .context("failed to load course page")?,
    );

    let stopper = Arc::clone(&controller);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, stopping after the current module");
            stopper.stop_run();
        }
    });

    let show_bar = !output::is_quiet() && !output::is_json();
    let renderer = tokio::spawn(render_progress(controller.subscribe(), show_bar));

    let result = controller.start_run().await;
    ctrl_c.abort();
    renderer.abort();

    let report = result?;
    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
    } else if !output::is_quiet() {
        print_summary(&report);
    }
    Ok(())
}

async fn render_progress(mut rx: RunEventReceiver, visible: bool) {
    let bar = if visible {
        ProgressBar::new(0)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("  {spinner} [{bar:30}] {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.event {
            RunEventKind::RunStarted {
                module_count,
                already_completed,
            } => {
                bar.set_length(module_count as u64);
                bar.set_position(already_completed as u64);
                bar.set_message("starting");
            }
            RunEventKind::ModuleStarted { index, category } => {
                bar.set_message(format!("module {index} ({category})"));
            }
            RunEventKind::ModuleCompleted { .. } => bar.inc(1),
            RunEventKind::ModuleFailed { index, error } => {
                bar.println(format!("  ✗ module {index}: {error}"));
            }
            RunEventKind::ModuleSkipped { index, reason } => {
                bar.println(format!("  - module {index} skipped: {reason}"));
            }
            RunEventKind::RunFinished { .. } => bar.set_message("checking server progress"),
            RunEventKind::Reconciled { .. } => {
                bar.finish_and_clear();
                break;
            }
            RunEventKind::ModuleUnlocked { .. } | RunEventKind::Warning { .. } => {}
        }
    }
}

fn print_summary(report: &RunReport) {
    let r = &report.reconciliation;
    println!();
    println!("  Run {}", report.run_id);
    println!(
        "  Local:     {}/{} modules completed ({} this run, {} failed)",
        report.completed,
        report.module_count,
        report.newly_completed(),
        report.failed()
    );
    match r.server_completed {
        Some(server) => println!("  Server:    {server}/{} modules completed", report.module_count),
        None => println!("  Server:    unavailable"),
    }
    println!("  Cancelled: {}", yes_no(report.cancelled));
    if r.discrepancy {
        println!(
            "  Discrepancy: local={}, server={}",
            r.local_completed,
            r.server_completed.unwrap_or_default()
        );
    }
    if r.reload_scheduled {
        println!("  Server state was ahead; local page reloaded.");
    }
}
