//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// smx - Probe container images and maintain a support matrix.
///
/// `-v` selects the release tag to probe; the program version is `-V`.
#[derive(Debug, Clone, Parser)]
#[command(name = "smx")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Release tag in YY.MM format (default: current year and month)
    #[arg(short = 'v', long = "version", value_name = "TAG")]
    pub release: Option<String>,

    /// JSON data file
    #[arg(short, long, value_name = "PATH", default_value = "docs/data.json")]
    pub file: PathBuf,

    /// YAML snippets file
    #[arg(short, long, value_name = "PATH", default_value = "docs/snippets.yaml")]
    pub snippets: PathBuf,

    /// Single container name, e.g. merlin-inference
    #[arg(short, long, value_name = "NAME")]
    pub container: Option<String>,

    /// Get data for containers that are already in the data file
    #[arg(long)]
    pub force: bool,

    /// Treat every non-zero exit status from a probe as a failure
    #[arg(long)]
    pub strict_exit_codes: bool,

    /// Do not open a pull request even if the data file changed
    #[arg(long)]
    pub skip_pr: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Print version
    #[arg(short = 'V', long = "program-version", action = ArgAction::Version)]
    pub program_version: Option<bool>,
}
