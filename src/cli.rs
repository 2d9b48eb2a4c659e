// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `dk`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dk",
    version,
    about = "Run deploy and automation tasks defined in a config file.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to run, in order.
    #[arg(value_name = "TASKS")]
    pub tasks: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `$DK_CONFIG`, else `config/dk.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List all tasks available to run.
    #[arg(short = 'T', long)]
    pub list_tasks: bool,

    /// Run the tasks without executing any local/remote cmds.
    #[arg(long)]
    pub dry_run: bool,

    /// Print out the tree of tasks/sub-tasks that would be run.
    #[arg(long, conflicts_with = "dry_run")]
    pub tree: bool,

    /// Show verbose (debug level) details.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `--verbose`, `DK_LOG`, `[log].level` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
