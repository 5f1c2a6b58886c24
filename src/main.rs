//! Binary entry point for tagsort.
//!
//! This binary provides the CLI interface for sorting, undo history, tag
//! queries and batch exports.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tagsort::cli;
use tagsort::config::TagsortConfig;
use tagsort::models::RoutingMode;
use tagsort::observability::{self, LoggingConfig};
use tagsort::services::{ExportMode, JobControl, OutcomeStatus, TagSort, VisualSortKey};

/// Tagsort - rule-driven sorting and tag queries for image collections.
#[derive(Parser)]
#[command(name = "tagsort")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Count and sample files matching a tag expression.
    Query {
        /// Tag expression, e.g. `elf|dwarf, forest, !armor`.
        #[arg(short, long)]
        tags: String,

        /// Maximum number of sample paths to print.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Export files matching a tag expression into a batch folder.
    Export {
        /// Tag expression.
        #[arg(short, long)]
        tags: String,

        /// Directory to create the batch folder in.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export mode: copy or symlink.
        #[arg(short, long, default_value = "copy", value_parser = parse_export_mode)]
        mode: ExportMode,

        /// Batch name (derived from the query when omitted).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List indexed tags.
    List {
        /// Sort order: count or name.
        #[arg(short, long, default_value = "count", value_parser = parse_tag_sort)]
        sort: TagSort,

        /// Maximum number of tags to print.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Sort files listed in a metadata manifest.
    Sort {
        /// JSON manifest mapping file paths to metadata.
        #[arg(long)]
        metadata: PathBuf,

        /// Routing mode: single, multi, smart_combination or all_combinations.
        #[arg(short, long, value_parser = parse_routing_mode)]
        mode: Option<RoutingMode>,

        /// Copy instead of move.
        #[arg(long)]
        copy: bool,
    },

    /// Undo the most recent operation.
    Undo,

    /// Redo the most recently undone operation.
    Redo,

    /// Show recorded operations.
    History {
        /// Maximum number of operations to print.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Resume an interrupted copy job.
    Resume {
        /// Drop the pending job instead of finishing it.
        #[arg(long)]
        discard: bool,
    },

    /// Route files by visual classification.
    Visual {
        /// JSON file mapping file paths to tagger confidences.
        #[arg(long)]
        scores: PathBuf,

        /// Attribute naming the folders: shot_type, person_count or rating.
        #[arg(short, long, default_value = "shot_type", value_parser = parse_sort_key)]
        by: VisualSortKey,

        /// Built-in profile restricting which files are routed.
        #[arg(short, long)]
        profile: Option<String>,

        /// Copy instead of move.
        #[arg(long)]
        copy: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "tagsort", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = match TagsortConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(logging) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let control = Arc::new(JobControl::new());
    let handler_control = Arc::clone(&control);
    if let Err(e) = ctrlc::set_handler(move || handler_control.cancel()) {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
    }

    match run_command(cli.command, &config, &control) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(
    command: Commands,
    config: &TagsortConfig,
    control: &JobControl,
) -> anyhow::Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let code = match command {
        Commands::Query { tags, limit } => {
            cli::cmd_query(&mut out, config, &tags, limit)?;
            ExitCode::SUCCESS
        },

        Commands::Export {
            tags,
            output,
            mode,
            name,
        } => {
            let report = cli::cmd_export(
                &mut out,
                config,
                &tags,
                output.as_deref(),
                mode,
                name.as_deref(),
                control,
            )
            .context("export failed")?;
            status_code(report.status())
        },

        Commands::List { sort, limit } => {
            cli::cmd_list(&mut out, config, sort, limit)?;
            ExitCode::SUCCESS
        },

        Commands::Sort {
            metadata,
            mode,
            copy,
        } => {
            let report = cli::cmd_sort(&mut out, config, &metadata, mode, copy, control)
                .with_context(|| format!("sorting {}", metadata.display()))?;
            status_code(report.status())
        },

        Commands::Undo => {
            let report = cli::cmd_undo(&mut out, config)?;
            report.map_or(ExitCode::SUCCESS, |r| status_code(r.status()))
        },

        Commands::Redo => {
            let report = cli::cmd_redo(&mut out, config)?;
            report.map_or(ExitCode::SUCCESS, |r| status_code(r.status()))
        },

        Commands::History { limit } => {
            cli::cmd_history(&mut out, config, limit)?;
            ExitCode::SUCCESS
        },

        Commands::Resume { discard } => {
            let report = cli::cmd_resume(&mut out, config, discard, control)?;
            report.map_or(ExitCode::SUCCESS, |r| status_code(r.status()))
        },

        Commands::Visual {
            scores,
            by,
            profile,
            copy,
        } => {
            let report = cli::cmd_visual(
                &mut out,
                config,
                &scores,
                by,
                profile.as_deref(),
                copy,
                control,
            )?;
            status_code(OutcomeStatus::from_counts(report.routed, report.failures.len()))
        },

        Commands::Completions { .. } => ExitCode::SUCCESS,
    };

    out.flush().context("flushing output")?;
    Ok(code)
}

/// Only a total failure is a failing exit; partial results are reported inline.
fn status_code(status: OutcomeStatus) -> ExitCode {
    match status {
        OutcomeStatus::Success | OutcomeStatus::Partial => ExitCode::SUCCESS,
        OutcomeStatus::Failed => ExitCode::FAILURE,
    }
}

fn parse_export_mode(s: &str) -> Result<ExportMode, String> {
    ExportMode::parse(s).ok_or_else(|| format!("unknown export mode '{s}' (copy, symlink)"))
}

fn parse_tag_sort(s: &str) -> Result<TagSort, String> {
    TagSort::parse(s).ok_or_else(|| format!("unknown sort order '{s}' (count, name)"))
}

fn parse_routing_mode(s: &str) -> Result<RoutingMode, String> {
    RoutingMode::parse(s).ok_or_else(|| {
        format!("unknown routing mode '{s}' (single, multi, smart_combination, all_combinations)")
    })
}

fn parse_sort_key(s: &str) -> Result<VisualSortKey, String> {
    VisualSortKey::parse(s)
        .ok_or_else(|| format!("unknown sort key '{s}' (shot_type, person_count, rating)"))
}
