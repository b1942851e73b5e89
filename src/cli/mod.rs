//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

use crate::config::RunConfig;

/// Run test suites with overlapping execution
#[derive(Parser, Debug)]
#[command(name = "parallel-suites")]
#[command(version)]
#[command(about = "Run suites and tests concurrently with per-test failure attribution")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run built-in demo suites
    Run(RunArgs),

    /// List built-in demo suites
    List(ListArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Demos to run (all shareable demos when omitted)
    pub demos: Vec<String>,

    /// Disable parallelism; suites and tests run one after another
    #[arg(long)]
    pub serial: bool,

    /// Default per-test timeout in milliseconds (0 disables)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Slow threshold in milliseconds
    #[arg(short, long)]
    pub slow: Option<u64>,

    /// Maximum concurrently running top-level suites
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Output format (spec, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Configuration file (searched in standard locations when omitted)
    #[arg(long)]
    pub config: Option<String>,

    /// Stream lifecycle events as JSON lines while running
    #[arg(long)]
    pub events: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Save results to file
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    /// Overlay flags on a configuration
    pub fn apply(&self, config: &mut RunConfig) {
        if self.serial {
            config.parallel = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if let Some(slow) = self.slow {
            config.slow_ms = slow;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = Some(concurrency);
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show expected totals for every demo
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with default settings
    Init {
        /// Output file path
        #[arg(short, long, default_value = "./parallel-suites.yaml")]
        output: String,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Show environment variables instead
        #[arg(short, long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Config file path (default: search standard locations)
        file: Option<String>,
    },
}
