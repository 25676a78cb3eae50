//! CLI argument parsing using clap derive API
//!
//! This module is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Layerlens -- container-image secret, vulnerability, and asset scanner.
///
/// Scans a remote image reference (e.g. `nginx:latest`, `ghcr.io/owner/app`)
/// or a local `docker save` archive (`path/to/image.tar`).
#[derive(Parser, Debug)]
#[command(name = "layerlens", version, about, long_about = None)]
pub struct Cli {
    /// Image reference `repo[:tag]` or path to a local `image.tar`.
    pub target: String,

    /// Comma-separated subset of scans to run: secrets,vuln,assets (default: all).
    #[arg(long)]
    pub scans: Option<String>,

    /// Scan every tag of the image instead of only the first.
    #[arg(long)]
    pub all_tags: bool,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format.
    #[arg(long, default_value = "json")]
    pub format: ReportFormat,

    /// Path to the secret regex corpus (JSON object of id -> pattern).
    #[arg(long, default_value = "regexes.json")]
    pub regex_db: PathBuf,

    /// Path to a JSON array of path patterns to exclude from scanning.
    #[arg(long)]
    pub exclude_file: Option<PathBuf>,

    /// Path to a local RubyGems advisory database (JSON array).
    #[arg(long)]
    pub gem_advisory_db: Option<PathBuf>,

    /// Enable RubyGems dependency-confusion probing (off by default).
    #[arg(long)]
    pub gem_confusion: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Machine-readable JSON array of per-tag results.
    Json,
    /// Self-contained HTML report.
    Html,
}
