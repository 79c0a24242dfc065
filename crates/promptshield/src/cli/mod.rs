//! Command-line interface for promptshield.
//!
//! This module provides the CLI structure for the `pshield` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{CheckCommand, ConfigCommand, ContextCommand, ScanCommand};

/// pshield - Strip injected instructions from untrusted files
///
/// Removes fake `"role": "system"` objects and base64-encoded phishing
/// payloads from text before it is handed to a language model.
#[derive(Debug, Parser)]
#[command(name = "pshield")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Filter files and print the cleaned text
    Scan(ScanCommand),

    /// Report injected content without changing anything
    Check(CheckCommand),

    /// Build the model-facing file context message
    Context(ContextCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Config(ConfigCommand::Path),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "pshield");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(cli(0, true).verbosity(), crate::logging::Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), crate::logging::Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), crate::logging::Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), crate::logging::Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let args = vec!["pshield", "scan", "--strict", "-j", "a.txt", "b.md"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Scan(cmd) => {
                assert!(cmd.strict);
                assert!(cmd.json);
                assert_eq!(cmd.files.len(), 2);
                assert!(cmd.output_dir.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_scan_output_dir() {
        let args = vec!["pshield", "scan", "-o", "/tmp/out", "a.txt"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Scan(ScanCommand { output_dir: Some(_), .. })
        ));
    }

    #[test]
    fn test_scan_requires_files() {
        assert!(Cli::try_parse_from(vec!["pshield", "scan"]).is_err());
    }

    #[test]
    fn test_parse_check() {
        let args = vec!["pshield", "check", "--json", "a.txt"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Command::Check(CheckCommand { json: true, .. })));
    }

    #[test]
    fn test_parse_context() {
        let args = vec!["pshield", "context", "--no-filter", "-m", "summarize", "a.txt"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Context(cmd) => {
                assert!(cmd.no_filter);
                assert_eq!(cmd.message.as_deref(), Some("summarize"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_validate() {
        let args = vec!["pshield", "config", "validate", "--file", "/tmp/c.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["pshield", "-c", "/custom/config.toml", "config", "path"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = vec!["pshield", "check", "a.txt", "-vv"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.verbose, 2);

        let args = vec!["pshield", "scan", "-q", "a.txt"];
        assert!(Cli::try_parse_from(args).unwrap().quiet);
    }
}
