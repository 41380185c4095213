// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! `modpilot status`: show the module table of a course page.

use crate::acquisition::page_source::PageSource;
use crate::cli::output::{self, yes_no};
use crate::cli::SessionOptions;
use crate::page::{CoursePage, ModuleRecord, SecurityToken};
use anyhow::{Context, Result};

pub async fn run(session: &SessionOptions) -> Result<()> {
    let connected = session.connect()?;
    let html = connected
        .source
        .fetch_page()
        .await
        .context("failed to fetch course page")?;
    let page = CoursePage::parse(&html);
    let modules: Vec<ModuleRecord> = (0..page.module_count())
        .filter_map(|i| page.read_module(i))
        .collect();
    let token = SecurityToken::resolve(&page, connected.endpoints.cookie.as_deref());
    let completed = page.completed_within(page.module_count());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "module_count": page.module_count(),
            "completed": completed,
            "token_found": token.is_some(),
            "modules": modules,
        }));
        return Ok(());
    }

    println!("  {:>5}  {:<11} {:<7} {:<10} data-id", "index", "type", "locked", "completed");
    for m in &modules {
        println!(
            "  {:>5}  {:<11} {:<7} {:<10} {}",
            m.index,
            m.category.to_string(),
            yes_no(m.locked),
            yes_no(m.completed),
            m.external_id.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("  {completed}/{} modules completed", page.module_count());
    match token {
        Some(t) => println!("  CSRF token: {} (from {:?})", t.redacted(), t.source),
        None => println!("  CSRF token: not found"),
    }
    Ok(())
}
