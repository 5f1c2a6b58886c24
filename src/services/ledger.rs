//! Undo/redo ledger for file operations.
//!
//! Every routing pass is recorded as one [`Operation`]. Undo replays its
//! movements backwards (moves go back, copies are deleted); redo replays
//! them forwards. A failure on one movement is reported and the rest still
//! run, and the operation always changes stacks.
//!
//! When opened with a store path the ledger persists both stacks after each
//! change, so `tagsort undo` works across process runs.

use super::router::{OutcomeStatus, copy_file, move_file};
use crate::models::{Movement, MovementKind, Operation, OperationStatus};
use crate::storage::{read_json, write_json_atomic};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Number of operations kept on the undo stack by default.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// A movement that could not be reversed or replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFailure {
    /// Path the step read from.
    pub from: PathBuf,
    /// Path the step wrote to.
    pub to: PathBuf,
    /// What went wrong.
    pub error: String,
}

/// Result of an undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Identifier of the replayed operation.
    pub operation_id: String,
    /// Name of the replayed operation.
    pub operation_name: String,
    /// Number of primary movements attempted.
    pub movements: usize,
    /// Number of file steps attempted, primaries and companions together.
    pub steps: usize,
    /// Steps that failed, in the order attempted.
    pub failures: Vec<MovementFailure>,
}

impl ReplayReport {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        OutcomeStatus::from_counts(
            self.steps.saturating_sub(self.failures.len()),
            self.failures.len(),
        )
    }

    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    undo: Vec<Operation>,
    #[serde(default)]
    redo: Vec<Operation>,
}

/// Records operations and reverses or replays them on request.
#[derive(Debug)]
pub struct OperationLedger {
    undo: VecDeque<Operation>,
    redo: Vec<Operation>,
    max_history: usize,
    store: Option<PathBuf>,
}

impl Default for OperationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl OperationLedger {
    /// Creates an in-memory ledger.
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_history: max_history.max(1),
            store: None,
        }
    }

    /// Opens a ledger persisted at `path`, loading existing history.
    pub fn open(path: impl Into<PathBuf>, max_history: usize) -> Result<Self> {
        let path = path.into();
        let state: LedgerState = read_json(&path)?.unwrap_or_default();
        let mut ledger = Self::new(max_history);
        ledger.undo = state.undo.into();
        ledger.redo = state.redo;
        while ledger.undo.len() > ledger.max_history {
            ledger.undo.pop_front();
        }
        ledger.store = Some(path);
        tracing::debug!(
            undo = ledger.undo.len(),
            redo = ledger.redo.len(),
            "Loaded operation history"
        );
        Ok(ledger)
    }

    /// Records movements as one operation.
    ///
    /// Clears the redo stack and evicts the oldest entry past the history
    /// cap. An empty movement list records nothing and returns `None`.
    #[instrument(skip(self, movements, metadata), fields(movements = movements.len()))]
    pub fn record(
        &mut self,
        movements: Vec<Movement>,
        name: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Option<&Operation>> {
        if movements.is_empty() {
            return Ok(None);
        }

        self.undo.push_back(Operation::new(name, movements, metadata));
        while self.undo.len() > self.max_history {
            if let Some(evicted) = self.undo.pop_front() {
                tracing::debug!(operation = %evicted.name, "Evicted oldest operation from history");
            }
        }
        self.redo.clear();
        self.persist()?;

        tracing::info!(operation = %name, "Recorded operation");
        Ok(self.undo.back())
    }

    /// Reverses the most recent operation.
    ///
    /// Returns `None` if there is nothing to undo.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> Result<Option<ReplayReport>> {
        let Some(mut operation) = self.undo.pop_back() else {
            return Ok(None);
        };

        let mut failures = Vec::new();
        for movement in operation.movements.iter().rev() {
            reverse_movement(movement, &mut failures);
        }

        operation.status = OperationStatus::Undone;
        let report = report_for(&operation, failures);
        self.redo.push(operation);
        self.persist()?;

        metrics::counter!("tagsort_operations_undone_total").increment(1);
        tracing::info!(
            operation = %report.operation_name,
            failures = report.failures.len(),
            "Undid operation"
        );
        Ok(Some(report))
    }

    /// Replays the most recently undone operation.
    ///
    /// Returns `None` if there is nothing to redo.
    #[instrument(skip(self))]
    pub fn redo(&mut self) -> Result<Option<ReplayReport>> {
        let Some(mut operation) = self.redo.pop() else {
            return Ok(None);
        };

        let mut failures = Vec::new();
        for movement in &operation.movements {
            replay_movement(movement, &mut failures);
        }

        operation.status = OperationStatus::Redone;
        let report = report_for(&operation, failures);
        self.undo.push_back(operation);
        while self.undo.len() > self.max_history {
            self.undo.pop_front();
        }
        self.persist()?;

        metrics::counter!("tagsort_operations_redone_total").increment(1);
        tracing::info!(
            operation = %report.operation_name,
            failures = report.failures.len(),
            "Redid operation"
        );
        Ok(Some(report))
    }

    /// Returns true if there is an operation to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns true if there is an operation to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// The operation `undo` would reverse.
    #[must_use]
    pub fn peek_undo(&self) -> Option<&Operation> {
        self.undo.back()
    }

    /// The operation `redo` would replay.
    #[must_use]
    pub fn peek_redo(&self) -> Option<&Operation> {
        self.redo.last()
    }

    /// Undo history, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &Operation> {
        self.undo.iter().rev()
    }

    /// Number of operations on the undo stack.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of operations on the redo stack.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Drops all history.
    pub fn clear(&mut self) -> Result<()> {
        self.undo.clear();
        self.redo.clear();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.store else {
            return Ok(());
        };
        let state = LedgerState {
            undo: self.undo.iter().cloned().collect(),
            redo: self.redo.clone(),
        };
        write_json_atomic(path, &state)
    }
}

fn report_for(operation: &Operation, failures: Vec<MovementFailure>) -> ReplayReport {
    ReplayReport {
        operation_id: operation.id.clone(),
        operation_name: operation.name.clone(),
        movements: operation.movements.len(),
        steps: operation
            .movements
            .iter()
            .map(|movement| 1 + movement.companions.len())
            .sum(),
        failures,
    }
}

fn reverse_movement(movement: &Movement, failures: &mut Vec<MovementFailure>) {
    match movement.kind {
        MovementKind::Move => {
            for companion in movement.companions.iter().rev() {
                step(&companion.destination, &companion.source, failures, relocate);
            }
            step(&movement.destination, &movement.source, failures, relocate);
        },
        MovementKind::Copy => {
            for companion in movement.companions.iter().rev() {
                step(&companion.destination, &companion.source, failures, |from, _| {
                    delete(from)
                });
            }
            step(&movement.destination, &movement.source, failures, |from, _| {
                delete(from)
            });
        },
    }
}

fn replay_movement(movement: &Movement, failures: &mut Vec<MovementFailure>) {
    let op: fn(&Path, &Path) -> std::result::Result<(), String> = match movement.kind {
        MovementKind::Move => relocate,
        MovementKind::Copy => duplicate,
    };
    step(&movement.source, &movement.destination, failures, op);
    for companion in &movement.companions {
        step(&companion.source, &companion.destination, failures, op);
    }
}

fn step<F>(from: &Path, to: &Path, failures: &mut Vec<MovementFailure>, op: F)
where
    F: FnOnce(&Path, &Path) -> std::result::Result<(), String>,
{
    if let Err(error) = op(from, to) {
        tracing::warn!(from = %from.display(), to = %to.display(), %error, "Ledger step failed");
        failures.push(MovementFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            error,
        });
    }
}

fn prepare(from: &Path, to: &Path) -> std::result::Result<(), String> {
    if !from.exists() {
        return Err(format!("file no longer exists: {}", from.display()));
    }
    if to.exists() {
        return Err(format!("target is occupied: {}", to.display()));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }
    Ok(())
}

fn relocate(from: &Path, to: &Path) -> std::result::Result<(), String> {
    prepare(from, to)?;
    move_file(from, to).map_err(|e| format!("move failed: {e}"))
}

fn duplicate(from: &Path, to: &Path) -> std::result::Result<(), String> {
    prepare(from, to)?;
    copy_file(from, to).map_err(|e| format!("copy failed: {e}"))
}

fn delete(path: &Path) -> std::result::Result<(), String> {
    if !path.exists() {
        return Err(format!("copy already missing: {}", path.display()));
    }
    fs::remove_file(path).map_err(|e| format!("delete failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanionTransfer, DestinationKind};

    fn moved(dir: &Path, name: &str, folder: &str) -> Movement {
        let source = dir.join(name);
        let destination = dir.join(folder).join(name);
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&source, name.as_bytes()).unwrap();
        move_file(&source, &destination).unwrap();
        Movement::new(MovementKind::Move, source, destination, DestinationKind::SingleTerm)
    }

    #[test]
    fn test_record_ignores_empty() {
        let mut ledger = OperationLedger::new(5);
        assert!(ledger.record(Vec::new(), "noop", BTreeMap::new()).unwrap().is_none());
        assert!(!ledger.can_undo());
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = OperationLedger::new(2);
        for i in 0..3 {
            let m = moved(dir.path(), &format!("{i}.png"), "x");
            ledger.record(vec![m], &format!("op{i}"), BTreeMap::new()).unwrap();
        }
        let names: Vec<&str> = ledger.history().map(|op| op.name.as_str()).collect();
        assert_eq!(names, vec!["op2", "op1"]);
    }

    #[test]
    fn test_undo_move_restores_source_and_recreates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("in");
        let destination = dir.path().join("out/a.png");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(nested.join("a.png"), b"a").unwrap();
        move_file(&nested.join("a.png"), &destination).unwrap();
        fs::remove_dir(&nested).unwrap();
        let m = Movement::new(
            MovementKind::Move,
            nested.join("a.png"),
            &destination,
            DestinationKind::SingleTerm,
        );

        let mut ledger = OperationLedger::new(5);
        ledger.record(vec![m], "sort", BTreeMap::new()).unwrap();
        let report = ledger.undo().unwrap().unwrap();

        assert!(report.is_complete());
        assert!(nested.join("a.png").exists());
        assert!(ledger.can_redo());
        assert_eq!(ledger.peek_redo().unwrap().status, OperationStatus::Undone);
    }

    #[test]
    fn test_undo_copy_deletes_copy_and_companions() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        let copy = dir.path().join("out/a.png");
        fs::create_dir_all(copy.parent().unwrap()).unwrap();
        fs::write(&source, b"x").unwrap();
        fs::write(&copy, b"x").unwrap();
        fs::write(dir.path().join("out/a.png.txt"), b"tags").unwrap();

        let movement = Movement::new(MovementKind::Copy, &source, &copy, DestinationKind::SingleTerm)
            .with_companions(vec![CompanionTransfer {
                source: dir.path().join("a.png.txt"),
                destination: dir.path().join("out/a.png.txt"),
            }]);

        let mut ledger = OperationLedger::new(5);
        ledger.record(vec![movement], "copy", BTreeMap::new()).unwrap();
        ledger.undo().unwrap();

        assert!(source.exists());
        assert!(!copy.exists());
        assert!(!dir.path().join("out/a.png.txt").exists());
    }

    #[test]
    fn test_missing_target_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = moved(dir.path(), "a.png", "x");
        let b = moved(dir.path(), "b.png", "x");
        fs::remove_file(&a.destination).unwrap();

        let mut ledger = OperationLedger::new(5);
        ledger.record(vec![a, b], "sort", BTreeMap::new()).unwrap();
        let report = ledger.undo().unwrap().unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.status(), OutcomeStatus::Partial);
        assert!(dir.path().join("b.png").exists());
        assert_eq!(ledger.redo_len(), 1);
    }

    #[test]
    fn test_companion_only_failure_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        let destination = dir.path().join("x/a.png");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, b"a").unwrap();
        // Recorded companion that has since vanished from the destination.
        let movement = Movement::new(
            MovementKind::Move,
            &source,
            &destination,
            DestinationKind::SingleTerm,
        )
        .with_companions(vec![CompanionTransfer {
            source: dir.path().join("a.png.txt"),
            destination: dir.path().join("x/a.png.txt"),
        }]);

        let mut ledger = OperationLedger::new(5);
        ledger.record(vec![movement], "sort", BTreeMap::new()).unwrap();
        let report = ledger.undo().unwrap().unwrap();

        assert_eq!(report.movements, 1);
        assert_eq!(report.steps, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.status(), OutcomeStatus::Partial);
        assert!(source.exists());
    }

    #[test]
    fn test_redo_replays_and_returns_to_undo_stack() {
        let dir = tempfile::tempdir().unwrap();
        let m = moved(dir.path(), "a.png", "x");
        let mut ledger = OperationLedger::new(5);
        ledger.record(vec![m], "sort", BTreeMap::new()).unwrap();
        ledger.undo().unwrap();

        let report = ledger.redo().unwrap().unwrap();
        assert!(report.is_complete());
        assert!(dir.path().join("x/a.png").exists());
        assert!(!dir.path().join("a.png").exists());
        assert_eq!(ledger.peek_undo().unwrap().status, OperationStatus::Redone);
        assert!(!ledger.can_redo());
    }

    #[test]
    fn test_record_clears_redo() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = OperationLedger::new(5);
        ledger
            .record(vec![moved(dir.path(), "a.png", "x")], "one", BTreeMap::new())
            .unwrap();
        ledger.undo().unwrap();
        ledger
            .record(vec![moved(dir.path(), "b.png", "x")], "two", BTreeMap::new())
            .unwrap();
        assert!(!ledger.can_redo());
    }

    #[test]
    fn test_nothing_to_undo_or_redo() {
        let mut ledger = OperationLedger::default();
        assert!(ledger.undo().unwrap().is_none());
        assert!(ledger.redo().unwrap().is_none());
    }

    #[test]
    fn test_history_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("state/history.json");
        {
            let mut ledger = OperationLedger::open(&store, 5).unwrap();
            let m = moved(dir.path(), "a.png", "x");
            ledger.record(vec![m], "sort", BTreeMap::new()).unwrap();
        }

        let mut reopened = OperationLedger::open(&store, 5).unwrap();
        assert_eq!(reopened.peek_undo().unwrap().name, "sort");
        reopened.undo().unwrap();
        assert!(dir.path().join("a.png").exists());

        let again = OperationLedger::open(&store, 5).unwrap();
        assert!(again.can_redo());
        assert!(!again.can_undo());
    }
}
