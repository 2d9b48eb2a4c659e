// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod params;
pub mod runner;
pub mod task;
pub mod types;

use std::io::Write;
use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::errors::DkError;
use crate::params::Params;
use crate::runner::Runner;
use crate::task::TaskRegistry;

/// High-level entry point used by `main.rs`.
///
/// - lists tasks (`--list-tasks`, or no task names given),
/// - rejects unknown task names before anything runs,
/// - picks a live, dry or tree runner and runs each named task in order.
///
/// Task lists and trees are written to `out`; logs go through `tracing`.
pub fn run(args: &CliArgs, cfg: &ConfigFile, out: &mut impl Write) -> Result<()> {
    let registry = Rc::new(cfg.registry());

    if args.list_tasks || args.tasks.is_empty() {
        writeln!(out, "{}", task_list(&registry))?;
        return Ok(());
    }

    let unknowns: Vec<String> = args
        .tasks
        .iter()
        .filter(|name| !registry.contains(name))
        .map(|name| format!("`{name}`"))
        .collect();
    if !unknowns.is_empty() {
        return Err(DkError::UnknownTask(unknowns.join(", ")).into());
    }

    let opts = cfg.runner_options();
    let mut runner = if args.dry_run {
        Runner::dry(registry, opts)
    } else if args.tree {
        let plural = if args.tasks.len() > 1 { "s" } else { "" };
        writeln!(out, "building task tree{plural}...")?;
        Runner::tree(registry, opts)
    } else {
        Runner::new(registry, opts)
    };
    debug!(kind = ?runner.kind(), tasks = ?args.tasks, "running tasks");

    let argv = args.tasks.join(" ");
    runner.log_cli_run(&argv, |runner| {
        for name in &args.tasks {
            runner.log_cli_task_run(name, |runner| runner.run(name, Params::default()).map(|_| ()))?;
            if let Some(tree) = runner.render_tree() {
                write!(out, "{tree}")?;
            }
        }
        Ok(())
    })?;

    Ok(())
}

/// One `name # description` line per task, names padded, sorted.
pub fn task_list(registry: &TaskRegistry) -> String {
    let width = registry.names().map(str::len).max().unwrap_or(0);
    let mut items: Vec<String> = registry
        .defs()
        .map(|def| {
            format!(
                "{:<width$} # {}",
                def.name(),
                def.desc().unwrap_or_default(),
                width = width
            )
        })
        .collect();
    items.sort();
    items.join("\n")
}
