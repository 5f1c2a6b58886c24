//! CLI command implementations.
//!
//! Each command loads what it needs from a [`TagsortConfig`], runs one
//! service and writes a human-readable summary to any [`std::io::Write`].
//! The binary decides exit codes from the returned values.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `query` | Count and sample files matching a tag expression |
//! | `list` | List indexed tags by count or name |
//! | `export` | Copy or link query results into a batch folder |
//! | `sort` | Route files from a metadata manifest by the configured rules |
//! | `undo` / `redo` | Replay the most recent operation backwards or forwards |
//! | `history` | Show recorded operations |
//! | `resume` | Finish or discard an interrupted copy job |
//! | `visual` | Route tagger-classified files by shot type, person count or rating |
//!
//! [`TagsortConfig`]: crate::config::TagsortConfig

mod export;
mod history;
mod query;
mod resume;
mod sort;
mod visual;

pub use export::cmd_export;
pub use history::{cmd_history, cmd_redo, cmd_undo};
pub use query::{cmd_list, cmd_query};
pub use resume::cmd_resume;
pub use sort::{cmd_sort, read_sort_manifest};
pub use visual::{cmd_visual, read_scores};

use crate::Error;

#[allow(clippy::needless_pass_by_value)]
fn output_error(e: std::io::Error) -> Error {
    Error::operation("write_output", e)
}
