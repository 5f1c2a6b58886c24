//! Sort command.

use super::output_error;
use crate::config::TagsortConfig;
use crate::models::{FileMetadata, RoutingMode, TransferMode};
use crate::services::{JobControl, SortInput, SortReport};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Reads a sort manifest of the form `{"<path>": {field: value} | null}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or lists no files.
pub fn read_sort_manifest(path: &Path) -> Result<Vec<SortInput>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::operation("read_sort_manifest", format!("{}: {e}", path.display())))?;
    let entries: BTreeMap<String, Option<FileMetadata>> =
        serde_json::from_str(&raw).map_err(|e| Error::operation("parse_sort_manifest", e))?;
    if entries.is_empty() {
        return Err(Error::InvalidInput(format!(
            "sort manifest {} lists no files",
            path.display()
        )));
    }
    Ok(entries
        .into_iter()
        .map(|(file, metadata)| SortInput::new(file, metadata))
        .collect())
}

/// Sorts the files listed in `manifest` and records the pass for undo.
///
/// # Errors
///
/// Returns an error if the manifest is unusable, no rules are configured,
/// free space is short, or the history cannot be saved.
pub fn cmd_sort<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    manifest: &Path,
    mode: Option<RoutingMode>,
    copy: bool,
    control: &JobControl,
) -> Result<SortReport> {
    let inputs = read_sort_manifest(manifest)?;

    let mut sorter = config.auto_sorter();
    if let Some(mode) = mode {
        sorter = sorter.with_mode(mode);
    }
    if copy {
        sorter = sorter.with_transfer(TransferMode::Copy);
    }
    let mut ledger = config.open_ledger()?;
    let report = sorter.sort(&inputs, control, &mut ledger)?;

    writeln!(
        out,
        "Processed {} files: {} sorted, {} unmatched, {} left in place ({} movements)",
        report.processed, report.sorted, report.unmatched, report.left_in_place, report.movements
    )
    .map_err(output_error)?;
    for (folder, count) in &report.term_counts {
        writeln!(out, "{count:>8}  {folder}").map_err(output_error)?;
    }
    for (category, count) in report.error_counts() {
        writeln!(out, "  {count} errors: {category}").map_err(output_error)?;
    }
    for error in &report.errors {
        writeln!(out, "  {}: {}", error.file.display(), error.message).map_err(output_error)?;
    }
    if let Some(id) = &report.operation_id {
        writeln!(out, "Recorded operation {id} (use `tagsort undo` to revert)")
            .map_err(output_error)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleSet, RuleSpec};

    fn rule(term: &str, priority: i64) -> RuleSpec {
        RuleSpec {
            term: term.to_string(),
            priority: Some(priority),
            ..RuleSpec::default()
        }
    }

    #[test]
    fn test_manifest_with_null_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"{"a.png": {"tags": "elf, forest"}, "b.png": null}"#,
        )
        .unwrap();

        let inputs = read_sort_manifest(&manifest).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].metadata.as_ref().map(FileMetadata::tags), Some("elf, forest"));
        assert!(inputs[1].metadata.is_none());
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(&manifest, "{}").unwrap();
        assert!(matches!(read_sort_manifest(&manifest), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_sort_records_operation() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in").join("a.png");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"png").unwrap();
        let manifest = dir.path().join("manifest.json");
        let body = serde_json::json!({ source.display().to_string(): { "tags": "elf" } });
        std::fs::write(&manifest, body.to_string()).unwrap();

        let config = TagsortConfig::default()
            .with_output_root(dir.path().join("sorted"))
            .with_state_dir(dir.path().join("state"))
            .with_rules(RuleSet::from_specs(vec![rule("elf", 1)]).unwrap());

        let mut out = Vec::new();
        let report =
            cmd_sort(&mut out, &config, &manifest, None, true, &JobControl::new()).unwrap();

        assert_eq!(report.sorted, 1);
        assert!(source.is_file());
        assert!(dir.path().join("sorted").join("elf").join("a.png").is_file());
        assert!(config.history_path().is_file());
        assert!(String::from_utf8(out).unwrap().contains("1 sorted"));
    }
}
