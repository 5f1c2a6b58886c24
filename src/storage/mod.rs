//! Crash-safe persistence for ledger history and job state.
//!
//! Small JSON documents are written through a temp file that is synced and
//! then renamed over the target, so a crash leaves either the previous or
//! the new document on disk, never a torn one.

mod json_file;

pub use json_file::{MAX_STATE_FILE_SIZE, read_json, remove_if_exists, write_json_atomic};
