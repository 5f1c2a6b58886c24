//! Visual sort command.

use super::output_error;
use crate::config::TagsortConfig;
use crate::models::TransferMode;
use crate::services::{
    JobControl, SortingProfile, VisualClassification, VisualSortKey, VisualSortReport,
};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Reads tagger output of the form `{"<path>": {"<tag>": confidence}}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_scores(config: &TagsortConfig, path: &Path) -> Result<Vec<VisualClassification>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::operation("read_visual_scores", format!("{}: {e}", path.display())))?;
    let scores: BTreeMap<String, BTreeMap<String, f32>> =
        serde_json::from_str(&raw).map_err(|e| Error::operation("parse_visual_scores", e))?;
    Ok(scores
        .into_iter()
        .map(|(file, tags)| config.classify(file, tags))
        .collect())
}

/// Routes classified files into one folder per attribute value.
///
/// # Errors
///
/// Returns an error for an unknown profile, an unreadable scores file, or
/// if the history cannot be saved.
pub fn cmd_visual<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    scores: &Path,
    key: VisualSortKey,
    profile: Option<&str>,
    copy: bool,
    control: &JobControl,
) -> Result<VisualSortReport> {
    let profile = profile
        .map(|name| {
            SortingProfile::builtin(name).ok_or_else(|| {
                let known: Vec<String> =
                    SortingProfile::builtins().into_iter().map(|p| p.name).collect();
                Error::InvalidInput(format!(
                    "unknown profile '{name}' (known: {})",
                    known.join(", ")
                ))
            })
        })
        .transpose()?;
    let classifications = read_scores(config, scores)?;

    let transfer = if copy {
        TransferMode::Copy
    } else {
        config.routing.transfer
    };
    let mut ledger = config.open_ledger()?;
    let report = config.visual_router().sort(
        &classifications,
        key,
        profile.as_ref(),
        &config.router(),
        transfer,
        control,
        &mut ledger,
    )?;

    writeln!(
        out,
        "Routed {} files by {key}, skipped {}",
        report.routed, report.skipped
    )
    .map_err(output_error)?;
    for (folder, count) in &report.folder_counts {
        writeln!(out, "{count:>8}  {folder}").map_err(output_error)?;
    }
    for failure in &report.failures {
        writeln!(out, "  failed: {}: {}", failure.folder_name, failure.error)
            .map_err(output_error)?;
    }

    Ok(report)
}
