//! Undo, redo and history commands.

use super::output_error;
use crate::Result;
use crate::config::TagsortConfig;
use crate::services::{OperationLedger, ReplayReport};
use std::io::Write;

/// Undoes the most recent operation.
///
/// # Errors
///
/// Returns an error if the history cannot be read or saved.
pub fn cmd_undo<W: Write>(out: &mut W, config: &TagsortConfig) -> Result<Option<ReplayReport>> {
    let mut ledger = config.open_ledger()?;
    let report = ledger.undo()?;
    write_replay(out, "Undid", "Nothing to undo", report.as_ref())?;
    Ok(report)
}

/// Redoes the most recently undone operation.
///
/// # Errors
///
/// Returns an error if the history cannot be read or saved.
pub fn cmd_redo<W: Write>(out: &mut W, config: &TagsortConfig) -> Result<Option<ReplayReport>> {
    let mut ledger = config.open_ledger()?;
    let report = ledger.redo()?;
    write_replay(out, "Redid", "Nothing to redo", report.as_ref())?;
    Ok(report)
}

/// Prints up to `limit` recorded operations, most recent first.
///
/// # Errors
///
/// Returns an error if the history cannot be read.
pub fn cmd_history<W: Write>(out: &mut W, config: &TagsortConfig, limit: usize) -> Result<()> {
    let ledger = config.open_ledger()?;
    write_history(out, &ledger, limit)
}

fn write_history<W: Write>(out: &mut W, ledger: &OperationLedger, limit: usize) -> Result<()> {
    if !ledger.can_undo() && !ledger.can_redo() {
        writeln!(out, "No recorded operations").map_err(output_error)?;
        return Ok(());
    }

    writeln!(
        out,
        "{} undoable, {} redoable",
        ledger.undo_len(),
        ledger.redo_len()
    )
    .map_err(output_error)?;
    for operation in ledger.history().take(limit) {
        writeln!(
            out,
            "{}  {}  {:<8}  {} ({} movements)",
            operation.timestamp.format("%Y-%m-%d %H:%M:%S"),
            operation.id,
            operation.status,
            operation.name,
            operation.movements.len()
        )
        .map_err(output_error)?;
    }
    if let Some(next) = ledger.peek_redo() {
        writeln!(out, "Next redo: {}", next.name).map_err(output_error)?;
    }
    Ok(())
}

fn write_replay<W: Write>(
    out: &mut W,
    verb: &str,
    empty: &str,
    report: Option<&ReplayReport>,
) -> Result<()> {
    let Some(report) = report else {
        writeln!(out, "{empty}").map_err(output_error)?;
        return Ok(());
    };

    writeln!(
        out,
        "{verb} '{}' ({} movements, {})",
        report.operation_name,
        report.movements,
        report.status()
    )
    .map_err(output_error)?;
    for failure in &report.failures {
        writeln!(
            out,
            "  {} -> {}: {}",
            failure.from.display(),
            failure.to.display(),
            failure.error
        )
        .map_err(output_error)?;
    }
    Ok(())
}
