// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run event types and broadcast channel for live run telemetry.
//!
//! The controller emits `RunEvent`s while it walks the modules. They flow
//! through a `tokio::sync::broadcast` channel to every subscriber (the CLI
//! progress bar, JSON output). When nobody subscribes, events are dropped.

use crate::page::Category;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    /// The kind of event.
    pub event: RunEventKind,
}

/// The specific kind of run event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEventKind {
    /// Module count probed and completion baseline seeded.
    RunStarted {
        module_count: usize,
        already_completed: usize,
    },
    /// A locked module was unlocked locally before its API call.
    ModuleUnlocked { index: usize },
    /// A module entered processing with this category.
    ModuleStarted { index: usize, category: Category },
    /// The API accepted the module and it was marked complete.
    ModuleCompleted {
        index: usize,
        modules_completed: Option<u64>,
        progress_level: Option<f64>,
    },
    /// The module was not sent to the API.
    ModuleSkipped { index: usize, reason: String },
    /// The API call failed; the run continues.
    ModuleFailed { index: usize, error: String },
    /// The module loop ended, normally or by cancellation.
    RunFinished {
        completed: usize,
        module_count: usize,
        cancelled: bool,
        elapsed_ms: u64,
    },
    /// Local and server counts were compared.
    Reconciled {
        server_completed: Option<usize>,
        local_completed: usize,
        reload_scheduled: bool,
    },
    /// A non-fatal warning.
    Warning { message: String },
}

/// Sender half shared by the controller.
pub type RunEventSender = broadcast::Sender<RunEvent>;

/// Receiver half handed to subscribers.
pub type RunEventReceiver = broadcast::Receiver<RunEvent>;

/// Create a broadcast channel sized for a typical course (a few events per module).
pub fn channel() -> (RunEventSender, RunEventReceiver) {
    broadcast::channel(256)
}

/// Stamps events with the run id and sequence number before sending.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: RunEventSender,
    run_id: String,
    seq: u64,
}

impl EventSink {
    pub fn new(tx: RunEventSender, run_id: impl Into<String>) -> Self {
        Self {
            tx,
            run_id: run_id.into(),
            seq: 0,
        }
    }

    /// Emit an event, silently ignoring the error raised when nobody listens.
    pub fn emit(&mut self, event: RunEventKind) {
        self.seq += 1;
        let _ = self.tx.send(RunEvent {
            run_id: self.run_id.clone(),
            seq: self.seq,
            event,
        });
    }
}
