//! Crash recovery for long copy jobs.
//!
//! A [`JobTracker`] persists a [`ResumableJob`] at a fixed state path when a
//! copy job starts and checkpoints it every few copies. If the process dies
//! mid-job, the next run finds the job through [`JobTracker::pending`] and
//! finishes it with [`JobTracker::resume`].

use super::control::{FileOutcome, JobControl};
use super::router::{FileRouter, OutcomeStatus};
use crate::models::{MovementKind, ResumableJob};
use crate::storage::{read_json, remove_if_exists, write_json_atomic};
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Copies between checkpoints by default.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

/// A source that could not be copied during resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    /// The source file.
    pub source: PathBuf,
    /// What went wrong.
    pub error: String,
}

/// Result of resuming a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    /// Job type tag.
    pub operation_type: String,
    /// Folder receiving the copies.
    pub output_folder: PathBuf,
    /// Sources in the job.
    pub total_files: usize,
    /// Sources copied before this resume.
    pub previously_copied: usize,
    /// Sources copied by this resume.
    pub copied: usize,
    /// Sources that failed.
    pub failures: Vec<CopyFailure>,
    /// Whether the resume stopped on cancellation.
    pub cancelled: bool,
    /// Whether the job finished and was cleared.
    pub completed: bool,
}

impl ResumeReport {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        OutcomeStatus::from_counts(self.copied, self.failures.len())
    }
}

/// Tracks one resumable job at a fixed state path.
#[derive(Debug)]
pub struct JobTracker {
    state_path: PathBuf,
    checkpoint_every: usize,
    job: Option<ResumableJob>,
}

impl JobTracker {
    /// Creates a tracker persisting to `state_path`.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>, checkpoint_every: usize) -> Self {
        Self {
            state_path: state_path.into(),
            checkpoint_every: checkpoint_every.max(1),
            job: None,
        }
    }

    /// Path of the persisted job.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// The job currently tracked in memory.
    #[must_use]
    pub const fn active(&self) -> Option<&ResumableJob> {
        self.job.as_ref()
    }

    /// Starts tracking a job and persists it immediately.
    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub fn start(
        &mut self,
        sources: Vec<PathBuf>,
        output: &Path,
        operation_type: &str,
    ) -> Result<()> {
        let job = ResumableJob::new(operation_type, sources, output);
        write_json_atomic(&self.state_path, &job)?;
        tracing::info!(
            operation_type,
            files = job.source_files.len(),
            "Started tracking copy job"
        );
        self.job = Some(job);
        Ok(())
    }

    /// Records `source` as copied, checkpointing every few marks.
    pub fn mark_copied(&mut self, source: &Path) -> Result<()> {
        let Some(job) = self.job.as_mut() else {
            return Ok(());
        };
        if job.copied_files.insert(source.to_path_buf())
            && job.copied_files.len() % self.checkpoint_every == 0
        {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Persists the in-memory job.
    pub fn checkpoint(&self) -> Result<()> {
        match &self.job {
            Some(job) => write_json_atomic(&self.state_path, job),
            None => Ok(()),
        }
    }

    /// Marks the job finished and clears its state.
    pub fn complete(&mut self) -> Result<()> {
        if let Some(job) = self.job.take() {
            tracing::info!(copied = job.copied_files.len(), "Copy job completed");
        }
        remove_if_exists(&self.state_path)
    }

    /// Drops any pending job without finishing it.
    pub fn discard(&mut self) -> Result<()> {
        self.job = None;
        tracing::info!("Discarded pending copy job");
        remove_if_exists(&self.state_path)
    }

    /// Returns the unfinished job, if any.
    ///
    /// A job that is already completed, or whose output folder is gone, is
    /// discarded instead.
    pub fn pending(&mut self) -> Result<Option<ResumableJob>> {
        let job = match self.job.take() {
            Some(job) => job,
            None => match read_json::<ResumableJob>(&self.state_path)? {
                Some(job) => job,
                None => return Ok(None),
            },
        };

        if job.completed || !job.output_folder.is_dir() {
            tracing::debug!(
                output = %job.output_folder.display(),
                completed = job.completed,
                "Discarding stale copy job"
            );
            self.discard()?;
            return Ok(None);
        }

        self.job = Some(job.clone());
        Ok(Some(job))
    }

    /// Copies the remaining sources of the pending job.
    ///
    /// Returns `None` if there is no pending job. On cancellation the job is
    /// checkpointed and stays pending.
    #[instrument(skip_all)]
    pub fn resume(
        &mut self,
        control: &JobControl,
        router: &FileRouter,
    ) -> Result<Option<ResumeReport>> {
        let Some(job) = self.pending()? else {
            return Ok(None);
        };

        let remaining = job.remaining();
        let mut report = ResumeReport {
            operation_type: job.operation_type.clone(),
            output_folder: job.output_folder.clone(),
            total_files: job.source_files.len(),
            previously_copied: job.copied_files.len(),
            copied: 0,
            failures: Vec::new(),
            cancelled: false,
            completed: false,
        };
        control.add_total(remaining.len());
        tracing::info!(remaining = remaining.len(), "Resuming copy job");

        for source in remaining {
            if !control.checkpoint() {
                report.cancelled = true;
                break;
            }

            match router.transfer_into(&source, &job.output_folder, MovementKind::Copy) {
                Ok(_) => {
                    self.mark_copied(&source)?;
                    report.copied += 1;
                    metrics::counter!("tagsort_resume_copies_total").increment(1);
                    control.report(&source, FileOutcome::Succeeded);
                },
                Err(e) => {
                    tracing::warn!(source = %source.display(), error = %e, "Resume copy failed");
                    report.failures.push(CopyFailure {
                        source: source.clone(),
                        error: e.to_string(),
                    });
                    control.report(&source, FileOutcome::Failed);
                },
            }
        }

        let finished = self.job.as_ref().is_none_or(|job| job.remaining().is_empty());
        if finished && !report.cancelled {
            self.complete()?;
            report.completed = true;
        } else {
            self.checkpoint()?;
        }
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sources(dir: &Path, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("img{i}.png"));
                fs::write(&path, format!("{i}")).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_start_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let state = dir.path().join("job.json");

        let mut tracker = JobTracker::new(&state, 10);
        tracker.start(sources(dir.path(), 2), &out, "batch_export").unwrap();
        assert!(state.exists());

        let mut fresh = JobTracker::new(&state, 10);
        let job = fresh.pending().unwrap().unwrap();
        assert_eq!(job.source_files.len(), 2);
        assert_eq!(job.operation_type, "batch_export");
    }

    #[test]
    fn test_mark_copied_checkpoints_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let state = dir.path().join("job.json");
        let files = sources(dir.path(), 5);

        let mut tracker = JobTracker::new(&state, 2);
        tracker.start(files.clone(), &out, "copy").unwrap();
        tracker.mark_copied(&files[0]).unwrap();
        let on_disk: ResumableJob = read_json(&state).unwrap().unwrap();
        assert!(on_disk.copied_files.is_empty());

        tracker.mark_copied(&files[1]).unwrap();
        let on_disk: ResumableJob = read_json(&state).unwrap().unwrap();
        assert_eq!(on_disk.copied_files.len(), 2);
    }

    #[test]
    fn test_pending_discards_when_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let state = dir.path().join("job.json");

        let mut tracker = JobTracker::new(&state, 10);
        tracker.start(sources(dir.path(), 1), &out, "copy").unwrap();
        fs::remove_dir(&out).unwrap();

        let mut fresh = JobTracker::new(&state, 10);
        assert!(fresh.pending().unwrap().is_none());
        assert!(!state.exists());
    }

    #[test]
    fn test_pending_skips_vanished_sources() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let files = sources(dir.path(), 3);

        let mut tracker = JobTracker::new(dir.path().join("job.json"), 10);
        tracker.start(files.clone(), &out, "copy").unwrap();
        fs::remove_file(&files[1]).unwrap();

        let job = tracker.pending().unwrap().unwrap();
        assert_eq!(job.remaining(), vec![files[0].clone(), files[2].clone()]);
    }

    #[test]
    fn test_resume_cancelled_keeps_job_pending() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let state = dir.path().join("job.json");

        let mut tracker = JobTracker::new(&state, 10);
        tracker.start(sources(dir.path(), 3), &out, "copy").unwrap();

        let control = JobControl::new();
        control.cancel();
        let report = tracker.resume(&control, &FileRouter::new()).unwrap().unwrap();

        assert!(report.cancelled);
        assert!(!report.completed);
        assert_eq!(report.copied, 0);
        assert!(state.exists());
    }

    #[test]
    fn test_resume_without_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JobTracker::new(dir.path().join("job.json"), 10);
        let report = tracker.resume(&JobControl::new(), &FileRouter::new()).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_discard_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let state = dir.path().join("job.json");

        let mut tracker = JobTracker::new(&state, 10);
        tracker.start(sources(dir.path(), 1), &out, "copy").unwrap();
        tracker.discard().unwrap();
        assert!(!state.exists());
        assert!(tracker.active().is_none());
    }
}
