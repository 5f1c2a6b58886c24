//! File routing.
//!
//! [`FileRouter::route`] transfers one primary file, plus any companion
//! side-car files, to every resolved destination. Free space is checked once
//! before the first transfer. In move mode the original is relocated exactly
//! once and later destinations are copied from its new location.

use crate::models::{
    CompanionTransfer, Destination, Movement, MovementKind, TransferMode,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Companion extensions used when none are configured.
pub const DEFAULT_COMPANION_EXTENSIONS: &[&str] = &[".txt", ".json", ".yaml", ".yml"];

/// Reports free space for the volume holding a path.
pub trait SpaceProbe: Send + Sync + fmt::Debug {
    /// Returns available bytes for the volume containing `path`.
    fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// [`SpaceProbe`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Overall state of a multi-part result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Everything succeeded.
    Success,
    /// Some parts failed, others succeeded.
    Partial,
    /// Nothing succeeded.
    Failed,
}

impl OutcomeStatus {
    /// Derives a status from success and failure counts.
    #[must_use]
    pub const fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }

    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A destination the router could not deliver to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationFailure {
    /// Destination directory.
    pub destination: PathBuf,
    /// Display folder name.
    pub folder_name: String,
    /// Why it failed.
    pub error: String,
}

/// Files placed by one [`FileRouter::transfer_into`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Final path of the primary file.
    pub target: PathBuf,
    /// Companions that travelled with the primary.
    pub companions: Vec<CompanionTransfer>,
    /// Companions that could not be placed, as `path: error`.
    pub companion_failures: Vec<String>,
}

/// Result of routing one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Successful transfers in destination order.
    pub movements: Vec<Movement>,
    /// Destinations that failed.
    pub failures: Vec<DestinationFailure>,
}

impl RouteOutcome {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        OutcomeStatus::from_counts(self.movements.len(), self.failures.len())
    }
}

/// Moves and copies files with their companions.
#[derive(Debug, Clone)]
pub struct FileRouter {
    companion_extensions: Vec<String>,
    probe: Arc<dyn SpaceProbe>,
}

impl Default for FileRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRouter {
    /// Creates a router with default companion extensions and the OS probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            companion_extensions: DEFAULT_COMPANION_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            probe: Arc::new(FsSpaceProbe),
        }
    }

    /// Sets the companion extensions (each including its leading dot).
    #[must_use]
    pub fn with_companion_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.companion_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the free-space probe.
    #[must_use]
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Returns the existing companion files of `file` as `(extension, path)`.
    #[must_use]
    pub fn companions(&self, file: &Path) -> Vec<(String, PathBuf)> {
        self.companion_extensions
            .iter()
            .map(|ext| (ext.clone(), with_suffix(file, ext)))
            .filter(|(_, path)| path.is_file())
            .collect()
    }

    /// Size of `file` plus its companions, in bytes.
    pub fn bundle_size(&self, file: &Path) -> Result<u64> {
        let primary = fs::metadata(file)
            .map_err(|e| Error::operation("stat_file", format!("{}: {e}", file.display())))?
            .len();
        let companions: u64 = self
            .companions(file)
            .iter()
            .filter_map(|(_, path)| fs::metadata(path).ok())
            .map(|m| m.len())
            .sum();
        Ok(primary.saturating_add(companions))
    }

    /// Fails if `bytes` plus a 10% margin exceeds free space near `target`.
    ///
    /// The probe runs on the nearest existing ancestor of `target`. If the
    /// probe itself fails the check is skipped with a warning.
    pub fn ensure_space(&self, bytes: u64, target: &Path) -> Result<()> {
        let required = bytes.saturating_add(bytes / 10);
        let probe_path = nearest_existing(target);

        match self.probe.available_space(&probe_path) {
            Ok(available) if available < required => Err(Error::InsufficientSpace {
                required,
                available,
                path: probe_path,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    path = %probe_path.display(),
                    error = %e,
                    "Could not determine free space, continuing"
                );
                Ok(())
            },
        }
    }

    /// Routes `file` to every destination.
    ///
    /// Per-destination failures are collected in the outcome; only a missing
    /// source or insufficient space fail the whole call, and both are checked
    /// before anything is touched.
    #[instrument(skip_all, fields(file = %file.display(), destinations = destinations.len(), mode = %mode))]
    pub fn route(
        &self,
        file: &Path,
        destinations: &[Destination],
        mode: TransferMode,
    ) -> Result<RouteOutcome> {
        let Some(first) = destinations.first() else {
            return Ok(RouteOutcome::default());
        };
        if !file.is_file() {
            return Err(Error::operation(
                "route_file",
                format!("source file not found: {}", file.display()),
            ));
        }

        let copies = u64::try_from(destinations.len()).unwrap_or(u64::MAX);
        self.ensure_space(self.bundle_size(file)?.saturating_mul(copies), &first.path)?;

        let mut outcome = RouteOutcome::default();
        let mut relocated: Option<PathBuf> = None;

        for destination in destinations {
            let (kind, source) = match (mode, &relocated) {
                (TransferMode::Copy, _) => (MovementKind::Copy, file.to_path_buf()),
                (TransferMode::Move, None) => (MovementKind::Move, file.to_path_buf()),
                (TransferMode::Move, Some(moved)) => (MovementKind::Copy, moved.clone()),
            };

            match self.transfer_into(&source, &destination.path, kind) {
                Ok(placed) => {
                    if kind == MovementKind::Move {
                        relocated = Some(placed.target.clone());
                    }
                    if !placed.companion_failures.is_empty() {
                        metrics::counter!("tagsort_route_failures_total").increment(1);
                        outcome.failures.push(DestinationFailure {
                            destination: destination.path.clone(),
                            folder_name: destination.folder_name.clone(),
                            error: format!(
                                "companions not transferred: {}",
                                placed.companion_failures.join("; ")
                            ),
                        });
                    }
                    outcome.movements.push(
                        Movement::new(kind, source, placed.target, destination.kind)
                            .with_terms(destination.terms.clone())
                            .with_companions(placed.companions),
                    );
                },
                Err(e) => {
                    tracing::warn!(
                        destination = %destination.path.display(),
                        error = %e,
                        "Routing to destination failed"
                    );
                    metrics::counter!("tagsort_route_failures_total").increment(1);
                    outcome.failures.push(DestinationFailure {
                        destination: destination.path.clone(),
                        folder_name: destination.folder_name.clone(),
                        error: e.to_string(),
                    });
                },
            }
        }

        metrics::counter!("tagsort_files_routed_total").increment(1);
        Ok(outcome)
    }

    /// Transfers `source` and its companions into `dir` under a free name.
    ///
    /// The name is chosen so the primary and every companion land free
    /// together (`img_1.png` with `img_1.png.txt`). The primary's failure
    /// is an error; companion failures are returned in the [`Transfer`].
    pub fn transfer_into(&self, source: &Path, dir: &Path, kind: MovementKind) -> Result<Transfer> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::operation("create_destination", format!("{}: {e}", dir.display())))?;

        let file_name = source.file_name().ok_or_else(|| {
            Error::InvalidInput(format!("source has no file name: {}", source.display()))
        })?;
        let companions = self.companions(source);
        let extensions: Vec<&str> = companions.iter().map(|(ext, _)| ext.as_str()).collect();
        let target = resolve_bundle_collision(&dir.join(file_name), &extensions);

        transfer(source, &target, kind)
            .map_err(|e| Error::operation(transfer_op(kind), format!("{}: {e}", source.display())))?;

        let mut placed = Transfer {
            target,
            companions: Vec::with_capacity(companions.len()),
            companion_failures: Vec::new(),
        };
        for (ext, companion) in companions {
            let companion_target = with_suffix(&placed.target, &ext);
            let result = if companion_target.exists() {
                Err(io::Error::new(io::ErrorKind::AlreadyExists, "target already exists"))
            } else {
                transfer(&companion, &companion_target, kind)
            };
            match result {
                Ok(()) => placed.companions.push(CompanionTransfer {
                    source: companion,
                    destination: companion_target,
                }),
                Err(e) => {
                    tracing::warn!(
                        companion = %companion.display(),
                        error = %e,
                        "Companion transfer failed"
                    );
                    placed
                        .companion_failures
                        .push(format!("{}: {e}", companion.display()));
                },
            }
        }

        Ok(placed)
    }
}

const fn transfer_op(kind: MovementKind) -> &'static str {
    match kind {
        MovementKind::Move => "move_file",
        MovementKind::Copy => "copy_file",
    }
}

fn transfer(source: &Path, target: &Path, kind: MovementKind) -> io::Result<()> {
    match kind {
        MovementKind::Move => move_file(source, target),
        MovementKind::Copy => copy_file(source, target),
    }
}

/// Moves a file, falling back to copy and delete across filesystems.
///
/// A failed fallback leaves no copy behind at `target`.
pub fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if fs::rename(source, target).is_err() {
        copy_file(source, target)?;
        remove_source(source, target)?;
    }
    Ok(())
}

/// Removes the source of a copied move, deleting the copy if that fails.
fn remove_source(source: &Path, target: &Path) -> io::Result<()> {
    fs::remove_file(source).inspect_err(|_| discard_partial(target))
}

/// Copies a file and carries over its modification time.
///
/// A failed copy leaves nothing at `target`.
pub fn copy_file(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target)?;
    fs::metadata(source)
        .and_then(|metadata| {
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(target, mtime)
        })
        .inspect_err(|_| discard_partial(target))
}

fn discard_partial(target: &Path) {
    if let Err(e) = fs::remove_file(target) {
        tracing::warn!(target = %target.display(), error = %e, "Could not remove partial copy");
    }
}

/// Returns `path`, or `{stem}_{n}{ext}` for the smallest free `n >= 1`.
///
/// # Examples
///
/// ```
/// use tagsort::services::resolve_collision;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("img.png");
/// assert_eq!(resolve_collision(&path), path);
/// std::fs::write(&path, b"x").unwrap();
/// assert_eq!(resolve_collision(&path), dir.path().join("img_1.png"));
/// ```
#[must_use]
pub fn resolve_collision(path: &Path) -> PathBuf {
    resolve_bundle_collision(path, &[])
}

/// Like [`resolve_collision`], but a candidate is only free when every
/// `candidate + suffix` is free too.
#[must_use]
pub fn resolve_bundle_collision(path: &Path, suffixes: &[&str]) -> PathBuf {
    let is_free = |candidate: &Path| {
        !candidate.exists()
            && suffixes
                .iter()
                .all(|suffix| !with_suffix(candidate, suffix).exists())
    };
    if is_free(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|n| parent.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Appends `suffix` to the full path, e.g. `img.png` + `.txt`.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn nearest_existing(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DestinationKind, Rule};

    #[derive(Debug)]
    struct FixedProbe(u64);

    impl SpaceProbe for FixedProbe {
        fn available_space(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    fn dest(root: &Path, term: &str) -> Destination {
        let rule = Rule::new(term);
        Destination::single(rule.term.clone(), &rule.folder_name, root)
    }

    #[test]
    fn test_resolve_collision_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        fs::write(&path, b"0").unwrap();
        let first = resolve_collision(&path);
        assert_eq!(first, dir.path().join("img_1.png"));
        fs::write(&first, b"1").unwrap();
        assert_eq!(resolve_collision(&path), dir.path().join("img_2.png"));
    }

    #[test]
    fn test_resolve_collision_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README");
        fs::write(&path, b"0").unwrap();
        assert_eq!(resolve_collision(&path), dir.path().join("README_1"));
    }

    #[test]
    fn test_copy_mode_copies_from_original_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in/a.png");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"data").unwrap();
        let out = dir.path().join("out");

        let router = FileRouter::new();
        let outcome = router
            .route(&src, &[dest(&out, "x"), dest(&out, "y")], TransferMode::Copy)
            .unwrap();

        assert_eq!(outcome.status(), OutcomeStatus::Success);
        assert!(src.exists());
        for movement in &outcome.movements {
            assert_eq!(movement.kind, MovementKind::Copy);
            assert_eq!(movement.source, src);
            assert!(movement.destination.exists());
        }
    }

    #[test]
    fn test_move_mode_moves_once_then_copies_from_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, b"data").unwrap();
        let out = dir.path().join("out");

        let outcome = FileRouter::new()
            .route(&src, &[dest(&out, "x"), dest(&out, "y")], TransferMode::Move)
            .unwrap();

        assert!(!src.exists());
        let [moved, copied] = outcome.movements.as_slice() else {
            panic!("expected two movements");
        };
        assert_eq!(moved.kind, MovementKind::Move);
        assert_eq!(moved.destination, out.join("x/a.png"));
        assert_eq!(copied.kind, MovementKind::Copy);
        assert_eq!(copied.source, out.join("x/a.png"));
        assert_eq!(fs::read(out.join("y/a.png")).unwrap(), b"data");
    }

    #[test]
    fn test_companions_travel_with_primary() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, b"img").unwrap();
        fs::write(dir.path().join("a.png.txt"), b"cat, dog").unwrap();
        fs::write(dir.path().join("a.png.json"), b"{}").unwrap();
        let out = dir.path().join("out");

        let outcome = FileRouter::new()
            .route(&src, &[dest(&out, "x")], TransferMode::Move)
            .unwrap();

        assert_eq!(outcome.movements[0].companions.len(), 2);
        assert!(out.join("x/a.png.txt").exists());
        assert!(out.join("x/a.png.json").exists());
        assert!(!dir.path().join("a.png.txt").exists());
    }

    #[test]
    fn test_collision_renames_companions_too() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("x")).unwrap();
        fs::write(out.join("x/a.png"), b"old").unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, b"new").unwrap();
        fs::write(dir.path().join("a.png.txt"), b"tags").unwrap();

        let outcome = FileRouter::new()
            .route(&src, &[dest(&out, "x")], TransferMode::Copy)
            .unwrap();

        assert_eq!(outcome.movements[0].destination, out.join("x/a_1.png"));
        assert!(out.join("x/a_1.png.txt").exists());
        assert_eq!(fs::read(out.join("x/a.png")).unwrap(), b"old");
    }

    #[test]
    fn test_stray_companion_at_destination_shifts_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/img.png");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"img").unwrap();
        fs::write(dir.path().join("src/img.png.txt"), b"cat").unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("cat")).unwrap();
        fs::write(out.join("cat/img.png.txt"), b"stale orphan").unwrap();

        let outcome = FileRouter::new()
            .route(&src, &[dest(&out, "cat")], TransferMode::Move)
            .unwrap();

        assert_eq!(outcome.status(), OutcomeStatus::Success);
        let movement = &outcome.movements[0];
        assert_eq!(movement.destination, out.join("cat/img_1.png"));
        assert_eq!(movement.companions.len(), 1);
        assert_eq!(movement.companions[0].destination, out.join("cat/img_1.png.txt"));
        assert!(!dir.path().join("src/img.png.txt").exists());
        assert_eq!(fs::read(out.join("cat/img_1.png.txt")).unwrap(), b"cat");
        assert_eq!(fs::read(out.join("cat/img.png.txt")).unwrap(), b"stale orphan");
    }

    #[test]
    fn test_bundle_collision_checks_every_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        fs::write(dir.path().join("img.png.json"), b"{}").unwrap();
        fs::write(dir.path().join("img_1.png.txt"), b"x").unwrap();

        assert_eq!(resolve_bundle_collision(&path, &[]), path);
        assert_eq!(
            resolve_bundle_collision(&path, &[".txt", ".json"]),
            dir.path().join("img_2.png")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_companion_failure_is_reported_per_destination() {
        let dir = tempfile::tempdir().unwrap();
        // 251-byte name: the companion (255 bytes) fits, but after the
        // collision suffix its target (257 bytes) exceeds NAME_MAX.
        let name = format!("{}.png", "a".repeat(247));
        let src = dir.path().join(&name);
        fs::write(&src, b"img").unwrap();
        fs::write(with_suffix(&src, ".txt"), b"tags").unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("x")).unwrap();
        fs::write(out.join("x").join(&name), b"taken").unwrap();

        let router = FileRouter::new().with_companion_extensions([".txt"]);
        let outcome = router
            .route(&src, &[dest(&out, "x")], TransferMode::Move)
            .unwrap();

        assert_eq!(outcome.movements.len(), 1);
        assert!(outcome.movements[0].companions.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].error.contains("companions not transferred"));
        assert_eq!(outcome.status(), OutcomeStatus::Partial);
        assert!(!src.exists());
        assert!(with_suffix(&src, ".txt").exists());
    }

    #[test]
    fn test_failed_move_fallback_removes_the_copy() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("copy.png");
        fs::write(&target, b"copied").unwrap();

        let err = remove_source(&dir.path().join("vanished.png"), &target).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!target.exists());
    }

    #[test]
    fn test_insufficient_space_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, vec![0u8; 100]).unwrap();
        let out = dir.path().join("out");

        let router = FileRouter::new().with_space_probe(Arc::new(FixedProbe(150)));
        let err = router
            .route(&src, &[dest(&out, "x"), dest(&out, "y")], TransferMode::Copy)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InsufficientSpace {
                required: 220,
                available: 150,
                ..
            }
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_partial_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.png");
        fs::write(&src, b"data").unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        // A regular file where a destination directory should be.
        fs::write(out.join("blocked"), b"not a dir").unwrap();

        let outcome = FileRouter::new()
            .route(
                &src,
                &[dest(&out, "blocked"), dest(&out, "ok")],
                TransferMode::Move,
            )
            .unwrap();

        assert_eq!(outcome.status(), OutcomeStatus::Partial);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.movements.len(), 1);
        assert_eq!(outcome.movements[0].kind, MovementKind::Move);
        assert_eq!(outcome.movements[0].dest_kind, DestinationKind::SingleTerm);
        assert!(out.join("ok/a.png").exists());
    }

    #[test]
    fn test_missing_source_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let result = FileRouter::new().route(
            &dir.path().join("missing.png"),
            &[dest(&out, "x")],
            TransferMode::Copy,
        );
        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_empty_destinations_is_noop() {
        let outcome = FileRouter::new()
            .route(Path::new("/nonexistent"), &[], TransferMode::Move)
            .unwrap();
        assert_eq!(outcome, RouteOutcome::default());
    }
}
