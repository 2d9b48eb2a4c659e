// src/logging.rs

//! Logging for `dk`.
//!
//! The engine never talks to `tracing` directly; runners log through the
//! small [`Logger`] trait so that dry/tree runs can swap in a [`NullLogger`]
//! and tests can capture lines. [`TracingLogger`] is the production
//! implementation and forwards every line as a `tracing` event.
//!
//! Priority for determining the console log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `--verbose` (debug)
//! 3. `DK_LOG` environment variable (e.g. "info", "debug")
//! 4. `[log].level` from the config file
//! 5. default to `info`
//!
//! Console logs are sent to STDERR so that tree / task list output on STDOUT
//! stays clean. If `[log].file` is configured, every debug-level line is
//! appended to that file as well.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::LogLevel;
use crate::config::LogSection;

/// The logger interface the engine calls around every task run and command.
pub trait Logger {
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Forwards log lines to `tracing` under the `dk` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!(target: "dk", "{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!(target: "dk", "{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "dk", "{msg}");
    }
}

/// Drops every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbose: bool, log: &LogSection) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None if verbose => tracing::Level::DEBUG,
        None => std::env::var("DK_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .or_else(|| log.level.as_deref().and_then(parse_level_str))
            .unwrap_or(tracing::Level::INFO),
    };

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::from_level(level));

    let file = match log.file.as_ref() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating log dir {:?}", parent))?;
                }
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {:?}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(handle))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub(crate) fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
