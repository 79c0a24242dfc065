//! `pshield` - CLI for promptshield
//!
//! This binary filters untrusted files for injected system instructions and
//! encoded phishing payloads.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use promptshield::cli::{CheckCommand, Cli, Command, ConfigCommand, ContextCommand, ScanCommand};
use promptshield::filter::{ContentFilter, FilterOptions};
use promptshield::ingest::{self, ChatMessage, FileContext};
use promptshield::{init_logging, Config};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pshield: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    // `config validate` reports load errors itself
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        let path = file.clone().or_else(|| cli.config.clone());
        return Ok(handle_validate(path.as_deref()));
    }

    let config = Config::load_from(cli.config.clone())?;
    let filter = ContentFilter::from_config(&config.filter);

    match cli.command {
        Command::Scan(cmd) => handle_scan(&config, &filter, &cmd),
        Command::Check(cmd) => handle_check(&config, &filter, &cmd),
        Command::Context(cmd) => handle_context(&config, &filter, &cmd),
        Command::Config(cmd) => handle_config(&config, &filter, cmd),
    }
}

fn read_file(path: &Path, config: &Config) -> CliResult<String> {
    Ok(ingest::read_uploaded_file(path, &config.ingest)?.content)
}

fn handle_scan(config: &Config, filter: &ContentFilter, cmd: &ScanCommand) -> CliResult<ExitCode> {
    let options = cmd.options(config.filter_options());

    for path in &cmd.files {
        let text = read_file(path, config)?;
        let result = filter.filter_advanced(&text, &options);
        if !result.success {
            return Err(format!("{}: {}", path.display(), result.errors.join("; ")).into());
        }
        info!(
            file = %path.display(),
            removed = result.filtered_count,
            "Scanned file"
        );

        let output = if cmd.json {
            result.to_json()?
        } else {
            result.cleaned_content
        };

        match &cmd.output_dir {
            Some(dir) => {
                let target = ingest::write_cleaned(dir, path, &output)?;
                info!(path = %target.display(), "Wrote cleaned file");
            }
            None => println!("{output}"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_check(config: &Config, filter: &ContentFilter, cmd: &CheckCommand) -> CliResult<ExitCode> {
    let options = FilterOptions {
        strict_mode: cmd.strict || config.filter.strict_mode,
        preserve_whitespace: true,
        log_matches: true,
    };

    let mut total = 0;
    let mut reports = Vec::new();
    for path in &cmd.files {
        let text = read_file(path, config)?;
        let result = filter.filter_advanced(&text, &options);
        if !result.success {
            return Err(format!("{}: {}", path.display(), result.errors.join("; ")).into());
        }
        total += result.filtered_count;

        if cmd.json {
            reports.push(serde_json::json!({
                "file": path,
                "filtered_count": result.filtered_count,
                "matches": result.matches,
                "warnings": result.warnings,
            }));
        } else {
            for record in &result.matches {
                let detail = record.pattern.as_deref().unwrap_or("system role");
                println!("{}:{}: {} ({detail})", path.display(), record.line, record.kind);
            }
            for warning in &result.warnings {
                println!("{}: warning: {warning}", path.display());
            }
        }
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if total == 0 {
        println!("No injected content found.");
    } else {
        println!();
        println!("{total} injected span(s) found in {} file(s).", cmd.files.len());
    }

    Ok(if total == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_context(config: &Config, filter: &ContentFilter, cmd: &ContextCommand) -> CliResult<ExitCode> {
    let (files, skipped) = ingest::read_uploaded_files(&cmd.files, &config.ingest)?;
    for warning in &skipped {
        eprintln!("pshield: skipped: {warning}");
    }

    let apply_filter = config.filter.enabled && !cmd.no_filter;
    let context = FileContext::sanitize_with(
        files,
        apply_filter.then_some(filter),
        &config.filter_options(),
    );
    for warning in &context.warnings {
        eprintln!("pshield: warning: {warning}");
    }

    let mut messages: Vec<ChatMessage> = cmd.message.iter().map(ChatMessage::user).collect();
    context.prepend_to(&mut messages);
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(ExitCode::SUCCESS)
}

fn handle_validate(path: Option<&Path>) -> ExitCode {
    let path = path.map_or_else(Config::default_config_path, Path::to_path_buf);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => {
            println!("Configuration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Configuration error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn handle_config(config: &Config, filter: &ContentFilter, cmd: ConfigCommand) -> CliResult<ExitCode> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Filter]");
                println!("  Enabled:             {}", config.filter.enabled);
                println!("  Strict mode:         {}", config.filter.strict_mode);
                println!("  Preserve whitespace: {}", config.filter.preserve_whitespace);
                println!("  Min payload length:  {}", config.filter.min_payload_length);
                println!("  Min printable ratio: {}", config.filter.min_printable_ratio);
                println!("  Builtin patterns:    {}", config.filter.use_builtin_patterns);
                println!(
                    "  Custom patterns:     {}",
                    config.filter.custom_phishing_patterns.len()
                );
                let names: Vec<&str> =
                    filter.matcher().patterns().iter().map(|p| p.name.as_str()).collect();
                println!("  Active patterns:     {}", names.join(", "));
                println!();
                println!("[Ingest]");
                println!("  Max file bytes:      {}", config.ingest.max_file_bytes);
                println!("  Max content chars:   {}", config.ingest.max_content_chars);
                println!(
                    "  Strip embedded:      {}",
                    config.ingest.strip_embedded_objects
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            return Ok(handle_validate(file.as_deref()));
        }
    }
    Ok(ExitCode::SUCCESS)
}
