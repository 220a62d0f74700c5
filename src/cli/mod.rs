//! CLI module for vloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for single runs,
//! batches, and offline validation.

pub mod batch_file;
pub mod commands;

pub use commands::Cli;
