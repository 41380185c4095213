// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Module processor: the per-module state machine.
//!
//! ```text
//! Unseen ─┬─ completed ────────────────────────────────► Done
//!         ├─ in skip list ─────────────────────────────► Skipped
//!         └─ (unlock if locked) ─► Processing ─┬─ video ─────► stream progress
//!                                              ├─ html / pdf ► single progress
//!                                              └─ other ─────► Skipped
//!    API success ─► Completed (mark + unlock next + record)
//!    API failure ─► Failed (nothing else mutated)
//! ```

use crate::completion::{ApiResult, CompletionApi};
use crate::config::RunConfig;
use crate::error::CompletionError;
use crate::page::{Category, CoursePage, SecurityToken};
use crate::progress::{EventSink, RunEventKind};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Indices known-completed by this run.
///
/// Grows only through [`CompletionSet::insert`]; it is rebuilt, never shrunk,
/// when a run seeds it from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSet(BTreeSet<usize>);

impl CompletionSet {
    /// Seed from modules already carrying the completed marker.
    pub fn seeded_from(page: &CoursePage) -> Self {
        Self(page.completed_indices().collect())
    }

    /// Record a completion. Returns `false` if it was already known.
    pub fn insert(&mut self, index: usize) -> bool {
        self.0.insert(index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

/// States a module moves through while it is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unseen,
    Done,
    Skipped,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unseen => "unseen",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a module was not sent to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Listed in the assessment skip list.
    SkipList,
    /// No completion protocol for this category.
    UnsupportedCategory { category: Category },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkipList => write!(f, "in assessment skip list"),
            Self::UnsupportedCategory { category } => {
                write!(f, "unsupported content type {category}")
            }
        }
    }
}

/// Terminal result of processing one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModuleOutcome {
    NotFound,
    AlreadyCompleted,
    Skipped { reason: SkipReason },
    Completed { result: ApiResult },
    Failed { error: CompletionError },
}

impl ModuleOutcome {
    pub fn final_state(&self) -> ModuleState {
        match self {
            Self::NotFound | Self::Failed { .. } => ModuleState::Failed,
            Self::AlreadyCompleted => ModuleState::Done,
            Self::Skipped { .. } => ModuleState::Skipped,
            Self::Completed { .. } => ModuleState::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Mutable state a run works on: the page snapshot and the completion set.
#[derive(Debug, Default)]
pub struct RunContext {
    pub page: CoursePage,
    pub completed: CompletionSet,
    pub module_count: usize,
    /// Session cookie header, the last token source.
    pub cookie: Option<String>,
}

impl RunContext {
    pub fn new(page: CoursePage, cookie: Option<String>) -> Self {
        let module_count = page.module_count();
        Self {
            page,
            completed: CompletionSet::default(),
            module_count,
            cookie,
        }
    }

    /// Re-probe the module count and seed the completion set from the page.
    pub fn initialize(&mut self) {
        self.module_count = self.page.module_count();
        self.completed = CompletionSet::seeded_from(&self.page);
        for index in self.completed.iter() {
            debug!("module {index} already completed");
        }
        info!(
            "found {}/{} modules already completed",
            self.completed.len(),
            self.module_count
        );
    }

    pub fn token(&self) -> Option<SecurityToken> {
        SecurityToken::resolve(&self.page, self.cookie.as_deref())
    }
}

fn transition(index: usize, from: ModuleState, to: ModuleState) -> ModuleState {
    debug!("module {index}: {from} -> {to}");
    to
}

/// Process one module: check, unlock, call the API, record the result.
///
/// A failure here never aborts the caller; it comes back as an outcome.
pub async fn process_module(
    ctx: &mut RunContext,
    api: &dyn CompletionApi,
    config: &RunConfig,
    events: &mut EventSink,
    index: usize,
) -> ModuleOutcome {
    let state = ModuleState::Unseen;

    let Some(module) = ctx.page.read_module(index) else {
        warn!("module {index} not found");
        return ModuleOutcome::NotFound;
    };

    if module.completed {
        transition(index, state, ModuleState::Done);
        info!("module {index} already completed");
        return ModuleOutcome::AlreadyCompleted;
    }

    if config.skip_list.contains(&index) {
        transition(index, state, ModuleState::Skipped);
        let reason = SkipReason::SkipList;
        info!("skipping module {index}: {reason}");
        events.emit(RunEventKind::ModuleSkipped {
            index,
            reason: reason.to_string(),
        });
        return ModuleOutcome::Skipped { reason };
    }

    if module.locked {
        ctx.page.unlock(index);
        info!("module {index} unlocked");
        events.emit(RunEventKind::ModuleUnlocked { index });
        tokio::time::sleep(config.unlock_delay).await;
    }

    let state = transition(index, state, ModuleState::Processing);
    info!("processing {} module {index}", module.category);
    events.emit(RunEventKind::ModuleStarted {
        index,
        category: module.category,
    });

    let stream = match module.category {
        Category::Video => true,
        Category::Html | Category::Pdf => false,
        category => {
            transition(index, state, ModuleState::Skipped);
            let reason = SkipReason::UnsupportedCategory { category };
            warn!("module {index}: {reason}");
            events.emit(RunEventKind::ModuleSkipped {
                index,
                reason: reason.to_string(),
            });
            return ModuleOutcome::Skipped { reason };
        }
    };

    let Some(external_id) = module.external_id.as_deref() else {
        return fail(index, state, events, CompletionError::MissingExternalId(index));
    };

    let token = ctx.token();
    if let Some(t) = &token {
        debug!("using CSRF token {} from {:?}", t.redacted(), t.source);
    }
    let token = token.as_ref().map(|t| t.value.as_str());

    let result = if stream {
        api.submit_stream_progress(external_id, token, ctx.completed.len())
            .await
    } else {
        api.submit_single_progress(external_id, token).await
    };

    if !result.success {
        let error = result
            .error
            .clone()
            .unwrap_or(CompletionError::AllVariantsExhausted);
        return fail(index, state, events, error);
    }

    if !result.progress_changed {
        // Static content counts as complete on HTTP success alone.
        warn!(
            "module {index}: API successful but server progress unchanged (modules={:?}, progress={:?})",
            result.modules_completed, result.progress_level
        );
    }

    transition(index, state, ModuleState::Completed);
    ctx.page.mark_complete(index);
    ctx.completed.insert(index);
    info!(
        "module {index} marked as completed (progress={:?}, modules={:?})",
        result.progress_level, result.modules_completed
    );
    events.emit(RunEventKind::ModuleCompleted {
        index,
        modules_completed: result.modules_completed,
        progress_level: result.progress_level,
    });
    tokio::time::sleep(config.complete_delay).await;

    ModuleOutcome::Completed { result }
}

fn fail(
    index: usize,
    state: ModuleState,
    events: &mut EventSink,
    error: CompletionError,
) -> ModuleOutcome {
    transition(index, state, ModuleState::Failed);
    warn!("failed to complete module {index}: {error}");
    events.emit(RunEventKind::ModuleFailed {
        index,
        error: error.to_string(),
    });
    ModuleOutcome::Failed { error }
}
