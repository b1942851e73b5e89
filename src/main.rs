//! Parallel suites - run hierarchical test suites with overlapping execution
//!
//! A CLI for running the built-in demo suites concurrently, or serially
//! for comparison.
//!
//! ## Usage
//!
//! ```bash
//! # Run every shareable demo concurrently
//! parallel-suites run
//!
//! # Run specific demos serially
//! parallel-suites run delay hooks --serial
//!
//! # Stream lifecycle events as JSON lines
//! parallel-suites run uncaught --events --format summary
//!
//! # List available demos
//! parallel-suites list --detailed
//!
//! # Create a configuration file
//! parallel-suites config init
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use parallel_suites::cli::{self, Args, Command};
use parallel_suites::config::{print_env_help, ConfigFile, EnvConfig, RunConfig};
use parallel_suites::output::{write_summary_to_file, OutputFormat, ResultFormatter};
use parallel_suites::utils::{init_logger, LogLevel};
use parallel_suites::{demos, Scheduler, StreamReporter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logger(LogLevel::from_verbose(args.verbose));

    match args.command {
        Command::Run(run_args) => run_demos(run_args).await,
        Command::List(list_args) => {
            list_demos(list_args);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(config_args) => {
            manage_config(config_args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Layer file, environment and flag settings
fn resolve_config(args: &cli::RunArgs, env: &EnvConfig) -> Result<RunConfig> {
    let file = match args.config.as_deref().or(env.config_file.as_deref()) {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };

    let mut config = file.run;
    config.apply_env(env);
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_demos(args: cli::RunArgs) -> Result<ExitCode> {
    let env = EnvConfig::load();
    let mut config = resolve_config(&args, &env)?;

    let selected = demos::select(&args.demos)?;
    if config.parallel && !selected.is_empty() && selected.iter().all(|d| d.serial) {
        info!("Selected demos disable parallelism");
        config.parallel = false;
    }

    let format = OutputFormat::from_str(&config.format).unwrap_or(OutputFormat::Spec);
    info!(
        "Running {} demo(s): {}",
        selected.len(),
        selected.iter().map(|d| d.name).collect::<Vec<_>>().join(", ")
    );

    let mut scheduler = Scheduler::new(config);
    if args.events {
        scheduler = scheduler.with_reporter(Arc::new(StreamReporter::stdout()));
    }
    let summary = scheduler.run(demos::root(&selected)).await;

    let mut formatter = ResultFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_summary(&summary));

    if let Some(path) = &args.output {
        write_summary_to_file(path, &summary, format)
            .with_context(|| format!("Failed to write results to {path}"))?;
        info!("Results saved to {}", path);
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_demos(args: cli::ListArgs) {
    println!("\nBuilt-in Demos ({} total)\n", demos::all().len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for demo in demos::all() {
        let mut notes = Vec::new();
        if demo.serial {
            notes.push("serial");
        }
        if demo.is_exclusive() {
            notes.push("only");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };

        if args.detailed {
            let expected = demo.expected;
            println!("  {:18} {}{}", demo.name, demo.description, notes);
            println!(
                "  {:18} expects {} passing, {} failing, {} pending",
                "", expected.passing, expected.failing, expected.pending
            );
        } else {
            println!("  {:18} {}{}", demo.name, demo.description, notes);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    println!("Demos marked [only] or [serial] run only when named explicitly.\n");
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::default().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
                println!();
                print_env_help();
            } else {
                let config = ConfigFile::load_default()?;
                let output = if format == "json" {
                    serde_json::to_string_pretty(&config)?
                } else {
                    serde_yaml::to_string(&config)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let path = file.unwrap_or_else(|| {
                ConfigFile::find()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "./parallel-suites.yaml".to_string())
            });

            match ConfigFile::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
