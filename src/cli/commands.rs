//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: one validate-and-retry execution from a template file
//! - batch: many executions from a YAML batch file
//! - validate: check a file with a registered validator, no generation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vloop - validate-and-retry loops around LLM generation
#[derive(Parser, Debug)]
#[command(name = "vloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer every generation call with this text instead of calling the API
    #[arg(long, global = true, value_name = "TEXT")]
    pub mock: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a template, generate, and retry until the output validates
    Run {
        /// Prompt template file ({{name}} placeholders)
        template: PathBuf,

        /// Template input as key=value (value parsed as JSON when possible)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Registered validator name
        #[arg(short = 'V', long, default_value = "json")]
        validator: String,

        /// Override the configured retry budget
        #[arg(short, long)]
        max_retries: Option<u32>,

        /// Write the JSON execution log to this path
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Run every request in a YAML batch file concurrently
    Batch {
        /// Batch file (YAML list of requests)
        file: PathBuf,

        /// Override the configured concurrency limit
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Write one JSON execution log per request into this directory
        #[arg(short, long)]
        log_dir: Option<PathBuf>,
    },

    /// Validate a file with a registered validator
    Validate {
        /// File to validate
        file: PathBuf,

        /// Registered validator name
        #[arg(short = 'V', long, default_value = "json")]
        validator: String,
    },

    /// List registered validators
    Validators,
}
