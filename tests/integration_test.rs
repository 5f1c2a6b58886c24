//! End-to-end tests for sorting, undo history, resumable jobs and queries.
//!
//! Every test works inside its own temporary directory and drives the
//! services the way the CLI does: built from a `TagsortConfig`.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tagsort::models::{
    Destination, FileMetadata, MovementKind, RoutingMode, RuleSet, RuleSpec, TransferMode,
};
use tagsort::services::{
    FileRouter, JobControl, JobTracker, OutcomeStatus, SortInput, TagIndex,
};
use tagsort::{Error, TagsortConfig};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn rule(term: &str, priority: i64) -> RuleSpec {
    RuleSpec {
        term: term.to_string(),
        priority: Some(priority),
        ..RuleSpec::default()
    }
}

/// Config rooted in `dir` with rules `elf` (priority 1) and `forest` (priority 2).
fn config(dir: &TempDir) -> TagsortConfig {
    TagsortConfig::default()
        .with_output_root(dir.path().join("sorted"))
        .with_state_dir(dir.path().join("state"))
        .with_rules(RuleSet::from_specs(vec![rule("elf", 1), rule("forest", 2)]).unwrap())
}

fn write_file(path: &Path, contents: &[u8]) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    path.to_path_buf()
}

/// All regular files below `root`, relative to it.
fn files_under(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut found = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                found.insert(relative, fs::read(&path).unwrap());
            }
        }
    }
    found
}

fn tagged(tags: &str) -> Option<FileMetadata> {
    Some(FileMetadata::new().with_field("tags", tags))
}

// ============================================================================
// Sorting
// ============================================================================

#[test]
fn test_move_all_combinations_produces_three_movements() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let source = write_file(&dir.path().join("in/img.png"), b"png");
    let out = dir.path().join("sorted");

    let mut sorter = config.auto_sorter();
    let mut ledger = config.open_ledger().unwrap();
    let report = sorter
        .sort(
            &[SortInput::new(&source, tagged("elf, forest"))],
            &JobControl::new(),
            &mut ledger,
        )
        .unwrap();

    assert_eq!(report.movements, 3);
    assert_eq!(report.status(), OutcomeStatus::Success);

    let operation = ledger.peek_undo().unwrap();
    let [moved, first_copy, combo_copy] = operation.movements.as_slice() else {
        panic!("expected three movements, got {}", operation.movements.len());
    };
    assert_eq!(moved.kind, MovementKind::Move);
    assert_eq!(moved.source, source);
    assert_eq!(moved.destination, out.join("elf/img.png"));

    assert_eq!(first_copy.kind, MovementKind::Copy);
    assert_eq!(first_copy.source, out.join("elf/img.png"));
    assert_eq!(first_copy.destination, out.join("forest/img.png"));

    assert_eq!(combo_copy.kind, MovementKind::Copy);
    assert_eq!(combo_copy.source, out.join("elf/img.png"));
    assert_eq!(combo_copy.destination, out.join("elf_forest/img.png"));

    assert!(!source.exists());
}

#[test]
fn test_undo_restores_tree_and_redo_reproduces_layout() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input = dir.path().join("in");
    write_file(&input.join("a.png"), b"a");
    write_file(&input.join("a.png.txt"), b"elf");
    write_file(&input.join("b.png"), b"b");
    write_file(&input.join("c.png"), b"c");
    let before = files_under(&input);

    let inputs = vec![
        SortInput::new(input.join("a.png"), Some(FileMetadata::new())),
        SortInput::new(input.join("b.png"), tagged("forest")),
        SortInput::new(input.join("c.png"), tagged("desert")),
    ];

    let mut ledger = config.open_ledger().unwrap();
    let report = config
        .auto_sorter()
        .sort(&inputs, &JobControl::new(), &mut ledger)
        .unwrap();
    assert_eq!(report.sorted, 2);
    assert_eq!(report.unmatched, 1);
    let sorted_layout = files_under(&config.output_root);
    assert!(sorted_layout.contains_key(Path::new("elf/a.png.txt")));
    assert!(sorted_layout.contains_key(Path::new("_unmatched/c.png")));

    // A fresh ledger reads the persisted history.
    let mut ledger = config.open_ledger().unwrap();
    let undo = ledger.undo().unwrap().unwrap();
    assert!(undo.is_complete());
    assert_eq!(files_under(&input), before);
    assert!(files_under(&config.output_root).is_empty());

    let redo = ledger.redo().unwrap().unwrap();
    assert!(redo.is_complete());
    assert_eq!(files_under(&config.output_root), sorted_layout);
    assert!(files_under(&input).is_empty());
}

#[test]
fn test_copy_mode_leaves_sources() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let source = write_file(&dir.path().join("in/img.png"), b"png");

    let mut ledger = config.open_ledger().unwrap();
    let report = config
        .auto_sorter()
        .with_mode(RoutingMode::SingleFolder)
        .with_transfer(TransferMode::Copy)
        .sort(
            &[SortInput::new(&source, tagged("forest, elf"))],
            &JobControl::new(),
            &mut ledger,
        )
        .unwrap();

    assert_eq!(report.movements, 1);
    assert!(source.is_file());
    assert!(config.output_root.join("elf/img.png").is_file());
}

#[test]
fn test_collisions_get_numbered_names() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let destination = Destination::single("elf", "elf", &out);
    write_file(&out.join("elf/img.png"), b"existing");
    let router = FileRouter::new();

    let first = write_file(&dir.path().join("one/img.png"), b"1");
    let second = write_file(&dir.path().join("two/img.png"), b"2");

    let outcome = router
        .route(&first, &[destination.clone()], TransferMode::Copy)
        .unwrap();
    assert_eq!(outcome.movements[0].destination, out.join("elf/img_1.png"));

    let outcome = router
        .route(&second, &[destination], TransferMode::Copy)
        .unwrap();
    assert_eq!(outcome.movements[0].destination, out.join("elf/img_2.png"));
    assert_eq!(fs::read(out.join("elf/img.png")).unwrap(), b"existing");
}

#[test]
fn test_stray_companion_in_destination_survives_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input = dir.path().join("in");
    write_file(&input.join("a.png"), b"a");
    write_file(&input.join("a.png.txt"), b"elf");
    write_file(&config.output_root.join("elf/a.png.txt"), b"stale orphan");
    let before = files_under(&input);

    let mut ledger = config.open_ledger().unwrap();
    let report = config
        .auto_sorter()
        .with_mode(RoutingMode::SingleFolder)
        .sort(
            &[SortInput::new(input.join("a.png"), Some(FileMetadata::new()))],
            &JobControl::new(),
            &mut ledger,
        )
        .unwrap();

    assert_eq!(report.status(), OutcomeStatus::Success);
    assert!(files_under(&input).is_empty());
    let sorted_layout = files_under(&config.output_root);
    assert_eq!(sorted_layout[Path::new("elf/a_1.png")], b"a");
    assert_eq!(sorted_layout[Path::new("elf/a_1.png.txt")], b"elf");
    assert_eq!(sorted_layout[Path::new("elf/a.png.txt")], b"stale orphan");

    let undo = ledger.undo().unwrap().unwrap();
    assert!(undo.is_complete());
    assert_eq!(undo.steps, 2);
    assert_eq!(files_under(&input), before);
    let remaining = files_under(&config.output_root);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[Path::new("elf/a.png.txt")], b"stale orphan");

    let redo = ledger.redo().unwrap().unwrap();
    assert!(redo.is_complete());
    assert_eq!(files_under(&config.output_root), sorted_layout);
}

// ============================================================================
// Resumable jobs
// ============================================================================

#[test]
fn test_interrupted_job_resumes_remaining_copies() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("batch");
    fs::create_dir_all(&output).unwrap();
    let sources: Vec<PathBuf> = (0..10)
        .map(|i| write_file(&dir.path().join(format!("src/img{i}.png")), b"x"))
        .collect();
    let state = dir.path().join("state/pending_job.json");

    {
        let mut tracker = JobTracker::new(&state, 10);
        tracker.start(sources.clone(), &output, "batch_export").unwrap();
        for source in &sources[..4] {
            fs::copy(source, output.join(source.file_name().unwrap())).unwrap();
            tracker.mark_copied(source).unwrap();
        }
        tracker.checkpoint().unwrap();
        // Dropped here without completing, as after a crash.
    }

    let mut tracker = JobTracker::new(&state, 10);
    let report = tracker
        .resume(&JobControl::new(), &FileRouter::new())
        .unwrap()
        .unwrap();

    assert_eq!(report.previously_copied, 4);
    assert_eq!(report.copied, 6);
    assert!(report.completed);
    assert_eq!(files_under(&output).len(), 10);
    assert!(!state.exists());
    assert!(tracker.pending().unwrap().is_none());
}

// ============================================================================
// Tag queries
// ============================================================================

fn overlap_index() -> TagIndex {
    let mut index = TagIndex::new();
    let a: Vec<String> = (0..100).map(|i| format!("f{i}.png")).collect();
    let b: Vec<String> = (0..15)
        .map(|i| format!("f{i}.png"))
        .chain((0..25).map(|i| format!("g{i}.png")))
        .collect();
    index.insert("a", Some(100), a);
    index.insert("b", Some(40), b);
    index.insert("c", Some(10), (90..100).map(|i| format!("f{i}.png")));
    index
}

#[test]
fn test_query_algebra_on_overlapping_tags() {
    let index = overlap_index();

    assert_eq!(index.query("a,b").unwrap().len(), 15);
    assert_eq!(index.query("a|b").unwrap().len(), 125);
    assert_eq!(index.query("a,!b").unwrap().len(), 85);
    assert_eq!(index.query("a, !c").unwrap().len(), 90);
    assert_eq!(index.query("(a|b), !c").unwrap().len(), 115);
}

#[test]
fn test_bad_queries_fail_with_messages() {
    let index = overlap_index();

    let err = index.query("").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
    assert!(!err.to_string().is_empty());

    let err = index.query("a, zebra").unwrap_err();
    let Error::UnknownTags { tags, .. } = &err else {
        panic!("expected unknown tags, got {err}");
    };
    assert_eq!(tags, &vec!["zebra".to_string()]);
}

#[test]
fn test_config_file_drives_sorting() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let toml = format!(
        r#"
        output_root = "{out}"
        state_dir = "{state}"

        [routing]
        mode = "single"
        on_no_match = "leave_in_place"

        [[rules]]
        term = "elf"
        folder_name = "Elves"
        "#,
        out = dir.path().join("sorted").display(),
        state = dir.path().join("state").display(),
    );
    fs::write(&config_path, toml).unwrap();
    let config = TagsortConfig::load(Some(&config_path)).unwrap();

    let hit = write_file(&dir.path().join("in/a.png"), b"a");
    let miss = write_file(&dir.path().join("in/b.png"), b"b");
    let mut ledger = config.open_ledger().unwrap();
    let report = config
        .auto_sorter()
        .sort(
            &[
                SortInput::new(&hit, tagged("elf")),
                SortInput::new(&miss, tagged("dwarf")),
            ],
            &JobControl::new(),
            &mut ledger,
        )
        .unwrap();

    assert_eq!(report.sorted, 1);
    assert_eq!(report.left_in_place, 1);
    assert!(config.output_root.join("Elves/a.png").is_file());
    assert!(miss.is_file());
}
