//! Pause, cancel and progress reporting for long jobs.
//!
//! A [`JobControl`] is shared through `Arc` between the worker running a
//! sort, export or resume and whoever drives it. The worker calls
//! [`JobControl::checkpoint`] once per file; that call blocks while paused
//! and reports whether the job was cancelled.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, PoisonError};

/// Outcome of one processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// The file was handled.
    Succeeded,
    /// The file failed.
    Failed,
    /// The file was skipped without error.
    Skipped,
}

/// One progress notification, sent per processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// The file just processed.
    pub file: PathBuf,
    /// What happened to it.
    pub outcome: FileOutcome,
    /// Files processed so far.
    pub processed: usize,
    /// Files in the job.
    pub total: usize,
}

/// Snapshot of a job's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Files in the job.
    pub total: usize,
    /// Files processed so far.
    pub processed: usize,
    /// Files that succeeded.
    pub succeeded: usize,
    /// Files that failed.
    pub failed: usize,
}

/// Shared control state for one long-running job.
#[derive(Debug, Default)]
pub struct JobControl {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    gate: Condvar,
    total: AtomicUsize,
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    events: Option<Mutex<Sender<ProgressEvent>>>,
}

impl JobControl {
    /// Creates a control with no event channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a control that sends a [`ProgressEvent`] per processed file.
    #[must_use]
    pub fn with_events(sender: Sender<ProgressEvent>) -> Self {
        Self {
            events: Some(Mutex::new(sender)),
            ..Self::default()
        }
    }

    /// Requests cancellation. Also releases a paused worker.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *paused = false;
        self.gate.notify_all();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Holds the worker at its next checkpoint.
    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Releases a paused worker.
    pub fn resume(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *paused = false;
        self.gate.notify_all();
    }

    /// Returns true while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while paused, without polling.
    pub fn wait_if_paused(&self) {
        let paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        let _released = self
            .gate
            .wait_while(paused, |paused| *paused && !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Waits at the pause gate, then returns false if the job should stop.
    pub fn checkpoint(&self) -> bool {
        self.wait_if_paused();
        !self.is_cancelled()
    }

    /// Adds `count` files to the job total.
    pub fn add_total(&self, count: usize) {
        self.total.fetch_add(count, Ordering::SeqCst);
    }

    /// Records one processed file and notifies the event channel.
    pub fn report(&self, file: &Path, outcome: FileOutcome) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        match outcome {
            FileOutcome::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            },
            FileOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            },
            FileOutcome::Skipped => {},
        }

        if let Some(events) = &self.events {
            let event = ProgressEvent {
                file: file.to_path_buf(),
                outcome,
                processed,
                total: self.total.load(Ordering::SeqCst),
            };
            let sender = events.lock().unwrap_or_else(PoisonError::into_inner);
            if sender.send(event).is_err() {
                tracing::trace!("Progress receiver dropped");
            }
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}
