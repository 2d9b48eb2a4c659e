// src/task/shell.rs

//! Config-defined tasks.
//!
//! A [`ShellTask`] runs a fixed list of [`Step`]s in order: local commands,
//! ssh commands and sub-tasks. Checked command steps fail the task when the
//! command fails; unchecked ones only log it.

use std::collections::BTreeMap;

use tracing::debug;

use super::context::TaskContext;
use super::{RunResult, Task};
use crate::exec::Hosts;
use crate::params::Params;
use crate::types::TaskName;

/// Options shared by `cmd` and `ssh` steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOpts {
    pub input: Option<String>,
    pub env: BTreeMap<String, String>,
    pub dry_tree_run: bool,
    /// Fail the task if the command does not succeed.
    pub check: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Cmd {
        cmd: String,
        opts: StepOpts,
    },
    Ssh {
        cmd: String,
        hosts: Option<Hosts>,
        opts: StepOpts,
    },
    Task {
        task: TaskName,
        params: Params,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ShellTask {
    steps: Vec<Step>,
}

impl ShellTask {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl Task for ShellTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        for step in &self.steps {
            match step {
                Step::Cmd { cmd, opts } => {
                    let mut call = ctx.cmd(cmd.as_str()).dry_tree_run(opts.dry_tree_run);
                    if let Some(input) = &opts.input {
                        call = call.input(input.as_str());
                    }
                    for (key, value) in &opts.env {
                        call = call.env(key.as_str(), value.as_str());
                    }
                    let result = if opts.check {
                        call.run_checked()?
                    } else {
                        call.run()?
                    };
                    if !result.success() {
                        ctx.log_error(&format!("`{cmd}` failed; continuing"));
                    }
                }
                Step::Ssh { cmd, hosts, opts } => {
                    let mut call = ctx.ssh(cmd.as_str()).dry_tree_run(opts.dry_tree_run);
                    if let Some(hosts) = hosts {
                        call = call.hosts(hosts.clone());
                    }
                    if let Some(input) = &opts.input {
                        call = call.input(input.as_str());
                    }
                    for (key, value) in &opts.env {
                        call = call.env(key.as_str(), value.as_str());
                    }
                    let result = if opts.check {
                        call.run_checked()?
                    } else {
                        call.run()?
                    };
                    if !result.success() {
                        ctx.log_error(&format!("`{cmd}` failed on some hosts; continuing"));
                    }
                }
                Step::Task { task, params } => {
                    debug!(task = %ctx.name(), sub_task = %task, "running sub-task step");
                    ctx.run_task(task, params.clone())?;
                }
            }
        }
        Ok(())
    }
}
