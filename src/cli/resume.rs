//! Resume command.

use super::output_error;
use crate::Result;
use crate::config::TagsortConfig;
use crate::services::{JobControl, ResumeReport};
use std::io::Write;

/// Finishes the pending copy job, or drops it when `discard` is set.
///
/// # Errors
///
/// Returns an error if the job state cannot be read or written.
pub fn cmd_resume<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    discard: bool,
    control: &JobControl,
) -> Result<Option<ResumeReport>> {
    let mut tracker = config.tracker();

    if discard {
        match tracker.pending()? {
            Some(job) => {
                tracker.discard()?;
                writeln!(
                    out,
                    "Discarded {} job ({} of {} files copied)",
                    job.operation_type,
                    job.copied_files.len(),
                    job.source_files.len()
                )
                .map_err(output_error)?;
            },
            None => writeln!(out, "No pending job").map_err(output_error)?,
        }
        return Ok(None);
    }

    let Some(report) = tracker.resume(control, &config.router())? else {
        writeln!(out, "No pending job").map_err(output_error)?;
        return Ok(None);
    };

    writeln!(
        out,
        "Resumed {} job into {}: {} copied now, {} before, {} total",
        report.operation_type,
        report.output_folder.display(),
        report.copied,
        report.previously_copied,
        report.total_files
    )
    .map_err(output_error)?;
    for failure in &report.failures {
        writeln!(out, "  failed: {}: {}", failure.source.display(), failure.error)
            .map_err(output_error)?;
    }
    let state = if report.completed { "completed" } else { "still pending" };
    writeln!(out, "Job {state}").map_err(output_error)?;

    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job(config: &TagsortConfig, root: &std::path::Path) -> std::path::PathBuf {
        let output = root.join("out");
        std::fs::create_dir_all(&output).unwrap();
        let sources: Vec<_> = (0..3)
            .map(|i| {
                let path = root.join(format!("img{i}.png"));
                std::fs::write(&path, b"png").unwrap();
                path
            })
            .collect();

        let mut tracker = config.tracker();
        tracker.start(sources.clone(), &output, "batch_export").unwrap();
        std::fs::copy(&sources[0], output.join("img0.png")).unwrap();
        tracker.mark_copied(&sources[0]).unwrap();
        tracker.checkpoint().unwrap();
        output
    }

    #[test]
    fn test_resume_finishes_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = TagsortConfig::default().with_state_dir(dir.path().join("state"));
        let output = pending_job(&config, dir.path());

        let mut out = Vec::new();
        let report = cmd_resume(&mut out, &config, false, &JobControl::new())
            .unwrap()
            .unwrap();

        assert_eq!(report.previously_copied, 1);
        assert_eq!(report.copied, 2);
        assert!(report.completed);
        assert!(output.join("img2.png").is_file());
        assert!(!config.job_state_path().exists());
    }

    #[test]
    fn test_discard_clears_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = TagsortConfig::default().with_state_dir(dir.path().join("state"));
        pending_job(&config, dir.path());

        let mut out = Vec::new();
        let report = cmd_resume(&mut out, &config, true, &JobControl::new()).unwrap();
        assert!(report.is_none());
        assert!(!config.job_state_path().exists());
        assert!(String::from_utf8(out).unwrap().contains("Discarded batch_export job (1 of 3"));
    }
}
