// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run controller. Iterates all modules with pacing and cancellation, then
//! reconciles local and server completion counts.
//!
//! One [`Controller`] owns all run state explicitly; nothing is process-wide.
//! Runs are single-flight: the running flag is claimed with a compare-exchange
//! before the first suspension point and released by a drop guard.
//! Cancellation is cooperative and observed only between modules.

use crate::acquisition::page_source::PageSource;
use crate::completion::{ApiResult, CompletionApi};
use crate::config::RunConfig;
use crate::error::{CompletionError, RunError, RunResult};
use crate::page::CoursePage;
use crate::processor::{process_module, CompletionSet, ModuleOutcome, RunContext};
use crate::progress::{self, EventSink, RunEventKind, RunEventReceiver, RunEventSender};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// Read-only progress readout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub running: bool,
    pub module_count: usize,
    pub completed: usize,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.module_count == 0 {
            return 0.0;
        }
        self.completed as f64 / self.module_count as f64 * 100.0
    }
}

/// Run-level state: whether a run is active, the probed module count and
/// the skip list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub running: bool,
    pub module_count: usize,
    pub skip_list: BTreeSet<usize>,
}

/// Post-run comparison of local and server completion counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Completed count in the fresh server copy; `None` if it could not be fetched.
    pub server_completed: Option<usize>,
    pub local_completed: usize,
    pub discrepancy: bool,
    pub reload_scheduled: bool,
}

/// Outcome of one module within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleReport {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub module_count: usize,
    pub completed: usize,
    pub cancelled: bool,
    pub modules: Vec<ModuleReport>,
    pub reconciliation: Reconciliation,
}

impl RunReport {
    /// Modules completed by this run's API calls.
    pub fn newly_completed(&self) -> usize {
        self.modules.iter().filter(|m| m.outcome.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.outcome, ModuleOutcome::Failed { .. }))
            .count()
    }
}

/// Releases the running flag however the run ends.
struct RunningGuard<'a> {
    controller: &'a Controller,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.controller.running.store(false, Ordering::SeqCst);
        self.controller
            .snapshot
            .send_modify(|snapshot| snapshot.running = false);
    }
}

/// Drives module completion for one course page.
pub struct Controller {
    api: Arc<dyn CompletionApi>,
    source: Arc<dyn PageSource>,
    config: RunConfig,
    running: AtomicBool,
    cancel: AtomicBool,
    ctx: Mutex<RunContext>,
    snapshot: watch::Sender<ProgressSnapshot>,
    events: RunEventSender,
}

impl Controller {
    /// Build a controller around an already-parsed page.
    pub fn new(
        api: Arc<dyn CompletionApi>,
        source: Arc<dyn PageSource>,
        config: RunConfig,
        page: CoursePage,
        cookie: Option<String>,
    ) -> Self {
        let mut ctx = RunContext::new(page, cookie);
        ctx.completed = CompletionSet::seeded_from(&ctx.page);
        let (snapshot, _) = watch::channel(ProgressSnapshot {
            running: false,
            module_count: ctx.module_count,
            completed: ctx.completed.len(),
        });
        let (events, _) = progress::channel();
        Self {
            api,
            source,
            config,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            ctx: Mutex::new(ctx),
            snapshot,
            events,
        }
    }

    /// Fetch the page from `source` and build a controller around it.
    pub async fn load(
        api: Arc<dyn CompletionApi>,
        source: Arc<dyn PageSource>,
        config: RunConfig,
        cookie: Option<String>,
    ) -> RunResult<Self> {
        let html = source.fetch_page().await.map_err(RunError::PageFetch)?;
        let page = CoursePage::parse(&html);
        info!("loaded course page with {} modules", page.module_count());
        Ok(Self::new(api, source, config, page, cookie))
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> RunEventReceiver {
        self.events.subscribe()
    }

    /// Watch the progress readout.
    pub fn watch_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current progress readout.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn run_state(&self) -> RunState {
        let snapshot = self.snapshot();
        RunState {
            running: self.running.load(Ordering::SeqCst),
            module_count: snapshot.module_count,
            skip_list: self.config.skip_list.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation. Takes effect before the next module; an
    /// in-flight API call and its delays always finish.
    pub fn stop_run(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        info!("stop requested");
    }

    /// Run over every module in ascending order, then reconcile.
    pub async fn start_run(&self) -> RunResult<RunReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("already running");
            return Err(RunError::AlreadyRunning);
        }
        let _guard = RunningGuard { controller: self };
        self.cancel.store(false, Ordering::SeqCst);

        let mut ctx = self.ctx.lock().await;
        ctx.initialize();
        if ctx.module_count == 0 {
            warn!("no modules found, not starting");
            self.publish(&ctx, false);
            return Err(RunError::NoModules);
        }
        self.publish(&ctx, true);

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut events = EventSink::new(self.events.clone(), run_id.clone());
        let started = Instant::now();
        let started_at = Utc::now();
        let module_count = ctx.module_count;

        info!("starting run {run_id} over {module_count} modules");
        events.emit(RunEventKind::RunStarted {
            module_count,
            already_completed: ctx.completed.len(),
        });

        let mut modules = Vec::with_capacity(module_count);
        let mut cancelled = false;
        for index in 0..module_count {
            if self.cancel.load(Ordering::SeqCst) {
                info!("run cancelled before module {index}");
                cancelled = true;
                break;
            }

            let outcome =
                process_module(&mut ctx, self.api.as_ref(), &self.config, &mut events, index)
                    .await;
            modules.push(ModuleReport { index, outcome });
            self.publish(&ctx, true);

            tokio::time::sleep(self.config.inter_module_delay).await;
        }

        let completed = ctx.completed.len();
        info!("run finished: {completed}/{module_count} modules completed locally");
        events.emit(RunEventKind::RunFinished {
            completed,
            module_count,
            cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        let reconciliation = self.reconcile(&mut ctx, &mut events).await;
        self.publish(&ctx, true);

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            module_count,
            completed,
            cancelled,
            modules,
            reconciliation,
        })
    }

    /// Compare local completions with a fresh server copy of the page.
    ///
    /// When the server reports more, the local page is replaced by the fresh
    /// copy after `reload_delay`. Other discrepancies are only reported.
    async fn reconcile(&self, ctx: &mut RunContext, events: &mut EventSink) -> Reconciliation {
        tokio::time::sleep(self.config.reconcile_delay).await;
        let local = ctx.completed.len();

        let fresh = match self.source.fetch_page().await {
            Ok(html) => CoursePage::parse(&html),
            Err(e) => {
                warn!("error checking server progress: {e:#}");
                events.emit(RunEventKind::Warning {
                    message: format!("server progress check failed: {e:#}"),
                });
                events.emit(RunEventKind::Reconciled {
                    server_completed: None,
                    local_completed: local,
                    reload_scheduled: false,
                });
                return Reconciliation {
                    server_completed: None,
                    local_completed: local,
                    discrepancy: false,
                    reload_scheduled: false,
                };
            }
        };

        let server = fresh.completed_within(ctx.module_count);
        info!(
            "server reports {server}/{} modules completed, local {local}",
            ctx.module_count
        );

        let discrepancy = server != local;
        let reload_scheduled = server > local;
        if discrepancy {
            warn!("discrepancy detected: local={local}, server={server}");
        }
        events.emit(RunEventKind::Reconciled {
            server_completed: Some(server),
            local_completed: local,
            reload_scheduled,
        });

        if reload_scheduled {
            info!(
                "server has more completed modules than local, reloading in {:?}",
                self.config.reload_delay
            );
            tokio::time::sleep(self.config.reload_delay).await;
            ctx.page = fresh;
            ctx.initialize();
        }

        Reconciliation {
            server_completed: Some(server),
            local_completed: local,
            discrepancy,
            reload_scheduled,
        }
    }

    /// Manual hook: submit stream progress for one module without touching
    /// local state. Refused while a run is active.
    pub async fn test_module(&self, index: usize) -> RunResult<ApiResult> {
        if self.is_running() {
            return Err(RunError::AlreadyRunning);
        }
        let Ok(ctx) = self.ctx.try_lock() else {
            return Err(RunError::AlreadyRunning);
        };

        let Some(module) = ctx.page.read_module(index) else {
            warn!("module {index} not found");
            return Ok(ApiResult::failed(CompletionError::ModuleNotFound(index)));
        };
        let Some(external_id) = module.external_id else {
            warn!("no data-id found for module {index}");
            return Ok(ApiResult::failed(CompletionError::MissingExternalId(index)));
        };

        info!(
            "testing API for module {index} ({}) with data-id {external_id}",
            module.category
        );
        let token = ctx.token();
        let result = self
            .api
            .submit_stream_progress(
                &external_id,
                token.as_ref().map(|t| t.value.as_str()),
                ctx.completed.len(),
            )
            .await;

        match &result.error {
            None => info!("API test successful for module {index}"),
            Some(e) => warn!("API test failed for module {index}: {e}"),
        }
        Ok(result)
    }

    fn publish(&self, ctx: &RunContext, running: bool) {
        self.snapshot.send_replace(ProgressSnapshot {
            running,
            module_count: ctx.module_count,
            completed: ctx.completed.len(),
        });
    }
}
