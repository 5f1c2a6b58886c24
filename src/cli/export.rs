//! Export command.

use super::output_error;
use crate::Result;
use crate::config::TagsortConfig;
use crate::services::{
    ExportMode, ExportReport, ExportRequest, JobControl, QueryAst, TagIndex, format_size,
    resolve_image_path,
};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exports the files matching `tags` into a new batch folder.
///
/// Copy exports are registered with the job tracker so an interrupted run
/// can be finished with `resume`.
///
/// # Errors
///
/// Returns a validation error for a bad query, or an error if the index
/// cannot be read, the batch folder cannot be created or space is short.
pub fn cmd_export<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    tags: &str,
    output: Option<&Path>,
    mode: ExportMode,
    name: Option<&str>,
    control: &JobControl,
) -> Result<ExportReport> {
    QueryAst::parse(tags)?;
    let index = TagIndex::load(&config.tag_index)?;
    let matches = index.query(tags)?;
    let files: Vec<PathBuf> = matches
        .iter()
        .map(|file| resolve_image_path(config.image_root.as_deref(), file))
        .collect();

    let mut request = ExportRequest::new(tags).with_mode(mode);
    if let Some(name) = name {
        request = request.with_name(name);
    }

    let exporter = config.exporter(output);
    let mut tracker = config.tracker();
    let report = exporter.export(&files, &request, control, Some(&mut tracker))?;

    writeln!(
        out,
        "Exported {}/{} files ({}) to {}",
        report.exported,
        report.total,
        format_size(report.total_size),
        report.batch_path.display()
    )
    .map_err(output_error)?;
    if report.skipped > 0 {
        writeln!(out, "Skipped {} missing files", report.skipped).map_err(output_error)?;
    }
    if report.link_fallbacks > 0 {
        writeln!(out, "Copied {} files that could not be linked", report.link_fallbacks)
            .map_err(output_error)?;
    }
    for failure in &report.failures {
        writeln!(out, "  failed: {}: {}", failure.file.display(), failure.error)
            .map_err(output_error)?;
    }
    writeln!(out, "Manifest: {}", report.manifest_path.display()).map_err(output_error)?;

    Ok(report)
}
