//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::filter::FilterOptions;

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Files to filter
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Only remove canonically formatted system objects
    #[arg(short, long)]
    pub strict: bool,

    /// Keep whitespace left behind by removed spans
    #[arg(short, long)]
    pub preserve_whitespace: bool,

    /// Output the full filter result as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Write cleaned files to this directory instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl ScanCommand {
    /// Merge command flags over the configured filter options.
    #[must_use]
    pub fn options(&self, base: FilterOptions) -> FilterOptions {
        FilterOptions {
            strict_mode: base.strict_mode || self.strict,
            preserve_whitespace: base.preserve_whitespace || self.preserve_whitespace,
            log_matches: base.log_matches || self.json,
        }
    }
}

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Files to inspect
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Only report canonically formatted system objects
    #[arg(short, long)]
    pub strict: bool,

    /// Output matches as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Context command arguments.
#[derive(Debug, Args)]
pub struct ContextCommand {
    /// Files to attach
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Attach file contents without filtering
    #[arg(long)]
    pub no_filter: bool,

    /// Append a user message after the file context
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
