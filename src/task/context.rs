// src/task/context.rs

//! What a task body sees while it runs.
//!
//! [`TaskContext`] ties one task instance (its definition and local params)
//! to the runner dispatching it. Everything a body does goes back through
//! the runner: param writes, sub-tasks, commands and logging.

use std::collections::BTreeMap;
use std::panic::Location;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Interrupt, RunResult, TaskDef, TaskHandle};
use crate::errors::{DkError, Result};
use crate::exec::{CmdOpts, Hosts, LocalCmd, RemoteCmd, SshOpts};
use crate::params::{Params, TaskView};
use crate::runner::{Runner, TaskRef};
use crate::types::{Phase, TaskName};

pub struct TaskContext<'r> {
    runner: &'r mut Runner,
    def: &'r Rc<TaskDef>,
    params: &'r Params,
}

impl<'r> TaskContext<'r> {
    pub fn new(runner: &'r mut Runner, def: &'r Rc<TaskDef>, params: &'r Params) -> Self {
        Self {
            runner,
            def,
            params,
        }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn def(&self) -> &TaskDef {
        self.def
    }

    pub fn runner(&mut self) -> &mut Runner {
        self.runner
    }

    // -- params --

    pub fn view(&self) -> TaskView<'_> {
        TaskView::new(self.def.name(), self.params, self.runner.params())
    }

    /// Strict read: task-local params, then the runner's.
    pub fn param(&self, key: &str) -> Result<Value> {
        self.view().param(key).cloned()
    }

    pub fn try_param(&self, key: &str) -> Option<Value> {
        self.view().try_param(key).cloned()
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.view().has_param(key)
    }

    pub fn param_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.view().param_as(key)
    }

    /// Write a runner-global param; every task sharing the runner sees it.
    pub fn set_param(&mut self, key: impl std::fmt::Display, value: impl Serialize) -> Result<()> {
        self.runner.set_param(key, value)
    }

    // -- dispatch --

    pub fn run_task(&mut self, name: &str, params: Params) -> Result<TaskHandle> {
        self.runner.run_task(name, params)
    }

    /// Stop the rest of this task's body. After callbacks still run.
    pub fn halt<T>(&self) -> RunResult<T> {
        Err(Interrupt::Halt)
    }

    // -- dynamic callbacks --

    pub fn before(&mut self, subject: &str, callback: impl Into<TaskName>, params: Params) {
        self.runner.add_task_callback(Phase::Before, subject, callback, params);
    }

    pub fn prepend_before(&mut self, subject: &str, callback: impl Into<TaskName>, params: Params) {
        self.runner
            .add_task_callback(Phase::PrependBefore, subject, callback, params);
    }

    pub fn after(&mut self, subject: &str, callback: impl Into<TaskName>, params: Params) {
        self.runner.add_task_callback(Phase::After, subject, callback, params);
    }

    pub fn prepend_after(&mut self, subject: &str, callback: impl Into<TaskName>, params: Params) {
        self.runner
            .add_task_callback(Phase::PrependAfter, subject, callback, params);
    }

    // -- commands --

    pub fn cmd<'c>(&'c mut self, cmd_str: impl Into<String>) -> CmdCall<'c, 'r> {
        CmdCall {
            ctx: self,
            cmd_str: cmd_str.into(),
            input: None,
            opts: CmdOpts::default(),
        }
    }

    pub fn ssh<'c>(&'c mut self, cmd_str: impl Into<String>) -> SshCall<'c, 'r> {
        SshCall {
            ctx: self,
            cmd_str: cmd_str.into(),
            input: None,
            opts: CmdOpts::default(),
        }
    }

    /// Hosts of a configured ssh group (empty if there is no such group).
    pub fn ssh_hosts(&self, group: &str) -> Vec<String> {
        self.runner
            .ssh_config()
            .hosts
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    // -- logging --

    pub fn log_info(&self, msg: &str) {
        self.runner.log_info(msg);
    }

    pub fn log_debug(&self, msg: &str) {
        self.runner.log_debug(msg);
    }

    pub fn log_error(&self, msg: &str) {
        self.runner.log_error(msg);
    }

    /// Hosts: explicit call-site hosts, else the task's default, each
    /// resolved against the runner's host groups.
    fn ssh_opts(&self, opts: &CmdOpts) -> SshOpts {
        let ssh = self.runner.ssh_config();
        let hosts = opts.hosts.clone().or_else(|| {
            self.def
                .default_ssh_hosts()
                .map(|source| source.resolve(&self.view()))
        });
        SshOpts {
            hosts: hosts.map(|hosts| hosts.resolve(&ssh.hosts)),
            ssh_args: opts.ssh_args.clone().unwrap_or_else(|| ssh.args.clone()),
            host_ssh_args: opts
                .host_ssh_args
                .clone()
                .unwrap_or_else(|| ssh.host_args.clone()),
            env: opts.env.clone(),
            dry_tree_run: opts.dry_tree_run,
        }
    }
}

/// A pending local command; finish with `run`, `run_checked` or `start`.
pub struct CmdCall<'c, 'r> {
    ctx: &'c mut TaskContext<'r>,
    cmd_str: String,
    input: Option<String>,
    opts: CmdOpts,
}

impl CmdCall<'_, '_> {
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn opts(mut self, opts: CmdOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.env.insert(key.into(), value.into());
        self
    }

    pub fn dry_tree_run(mut self, value: bool) -> Self {
        self.opts.dry_tree_run = value;
        self
    }

    /// Run and return the command; the caller checks `success()`.
    pub fn run(self) -> Result<LocalCmd> {
        let task = TaskRef::new(self.ctx.def.name(), self.ctx.params);
        self.ctx
            .runner
            .cmd(task, &self.cmd_str, self.input.as_deref(), self.opts)
    }

    /// Run and fail with [`DkError::CmdRun`] unless it succeeded.
    #[track_caller]
    pub fn run_checked(self) -> Result<LocalCmd> {
        let location = Location::caller();
        let cmd = self.run()?;
        if !cmd.success() {
            return Err(DkError::CmdRun {
                cmd: cmd.cmd_str(),
                location: location.to_string(),
            });
        }
        Ok(cmd)
    }

    /// Start without waiting; call `wait()` on the returned command.
    pub fn start(self) -> Result<LocalCmd> {
        let task = TaskRef::new(self.ctx.def.name(), self.ctx.params);
        self.ctx
            .runner
            .start(task, &self.cmd_str, self.input.as_deref(), self.opts)
    }
}

/// A pending remote command; finish with `run` or `run_checked`.
pub struct SshCall<'c, 'r> {
    ctx: &'c mut TaskContext<'r>,
    cmd_str: String,
    input: Option<String>,
    opts: CmdOpts,
}

impl SshCall<'_, '_> {
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn opts(mut self, opts: CmdOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.env.insert(key.into(), value.into());
        self
    }

    pub fn dry_tree_run(mut self, value: bool) -> Self {
        self.opts.dry_tree_run = value;
        self
    }

    pub fn hosts(mut self, hosts: impl Into<Hosts>) -> Self {
        self.opts.hosts = Some(hosts.into());
        self
    }

    pub fn ssh_args(mut self, args: impl Into<String>) -> Self {
        self.opts.ssh_args = Some(args.into());
        self
    }

    pub fn host_ssh_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.opts.host_ssh_args = Some(args);
        self
    }

    pub fn run(self) -> Result<RemoteCmd> {
        let ssh_opts = self.ctx.ssh_opts(&self.opts);
        let task = TaskRef::new(self.ctx.def.name(), self.ctx.params);
        self.ctx.runner.ssh(
            task,
            &self.cmd_str,
            self.input.as_deref(),
            self.opts,
            ssh_opts,
        )
    }

    /// Run and fail with [`DkError::SshRun`] unless every host succeeded.
    #[track_caller]
    pub fn run_checked(self) -> Result<RemoteCmd> {
        let location = Location::caller();
        let cmd = self.run()?;
        if !cmd.success() {
            return Err(DkError::SshRun {
                cmd: cmd.cmd_str(),
                location: location.to_string(),
            });
        }
        Ok(cmd)
    }
}
