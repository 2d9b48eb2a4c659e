// src/runner/mod.rs

//! The runner: builds and runs tasks, dispatches their commands.
//!
//! One [`Runner`] type serves every execution mode; [`RunnerKind`] only
//! changes how tasks and commands are dispatched, never callback ordering:
//!
//! - `Live` runs everything for real and ignores stubs.
//! - `Dry` runs every task but builds spies instead of real commands, unless
//!   a call opts in with `dry_tree_run` (a stub still wins over the opt-in).
//! - `Tree` is `Dry` with logging disabled, recording each task run in a
//!   tree that can be rendered after every top-level run.
//! - `Test` runs only the task given to [`Runner::run`]; sub-tasks and
//!   callbacks are recorded as [`TaskRun`]s, commands are always spies and
//!   are recorded too.
//!
//! The runner owns the only shared mutable state of a run: the global params
//! and the set of tasks that have run.

pub mod log;
pub mod runs;
pub mod stubs;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::exec::{CmdOpts, Command, LocalCmd, RemoteCmd, SshOpts};
use crate::logging::{Logger, NullLogger, TracingLogger};
use crate::params::{Params, TaskView};
use crate::task::{Callback, CallbackSet, TaskDef, TaskHandle, TaskRegistry};
use crate::types::{Direction, Phase, TaskName};

use self::log::{
    CLI_BLANK_LINES, CMD_PREFIX, INDENT, OUTPUT_PREFIX, SSH_PREFIX, TASK_END_PREFIX,
    TASK_START_PREFIX, pretty_run_time, rule,
};
pub use self::runs::{Run, TaskRun, TreeState};
pub use self::stubs::{CallKey, CannedOutput, DryTreeStub, StubArg, StubKey, StubSet};

/// Ssh defaults: named host groups, ssh args, per-host ssh args.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshConfig {
    pub hosts: BTreeMap<String, Vec<String>>,
    pub args: String,
    pub host_args: BTreeMap<String, String>,
}

/// Everything a runner is built from besides the task registry.
#[derive(Default)]
pub struct RunnerOptions {
    pub params: Params,
    pub ssh: SshConfig,
    /// Defaults to [`TracingLogger`]; tree runners always use [`NullLogger`].
    pub logger: Option<Box<dyn Logger>>,
    /// Installed as stubs by dry and tree runners only.
    pub dry_tree_cmd_stubs: Vec<DryTreeStub>,
    pub dry_tree_ssh_stubs: Vec<DryTreeStub>,
}

/// The task a command is dispatched for, as seen by deferred stub keys.
#[derive(Debug, Clone, Copy)]
pub struct TaskRef<'a> {
    pub name: &'a str,
    pub params: &'a Params,
}

impl<'a> TaskRef<'a> {
    pub fn new(name: &'a str, params: &'a Params) -> Self {
        Self { name, params }
    }
}

#[derive(Debug)]
pub enum RunnerKind {
    Live,
    Dry,
    Tree(TreeState),
    Test(Vec<Run>),
}

pub struct Runner {
    registry: Rc<TaskRegistry>,
    params: Params,
    callbacks: HashMap<TaskName, HashMap<Phase, CallbackSet>>,
    ssh: SshConfig,
    logger: Box<dyn Logger>,
    has_run: HashSet<TaskName>,
    cmd_stubs: StubSet<LocalCmd>,
    ssh_stubs: StubSet<RemoteCmd>,
    kind: RunnerKind,
}

impl Runner {
    pub fn new(registry: Rc<TaskRegistry>, opts: RunnerOptions) -> Self {
        Self::with_kind(registry, opts, RunnerKind::Live)
    }

    pub fn dry(registry: Rc<TaskRegistry>, opts: RunnerOptions) -> Self {
        Self::with_kind(registry, opts, RunnerKind::Dry)
    }

    pub fn tree(registry: Rc<TaskRegistry>, mut opts: RunnerOptions) -> Self {
        opts.logger = Some(Box::new(NullLogger));
        Self::with_kind(registry, opts, RunnerKind::Tree(TreeState::default()))
    }

    pub fn test(registry: Rc<TaskRegistry>, opts: RunnerOptions) -> Self {
        Self::with_kind(registry, opts, RunnerKind::Test(Vec::new()))
    }

    fn with_kind(registry: Rc<TaskRegistry>, opts: RunnerOptions, kind: RunnerKind) -> Self {
        let RunnerOptions {
            params,
            ssh,
            logger,
            dry_tree_cmd_stubs,
            dry_tree_ssh_stubs,
        } = opts;

        let mut runner = Self {
            registry,
            params,
            callbacks: HashMap::new(),
            ssh,
            logger: logger.unwrap_or_else(|| Box::new(TracingLogger)),
            has_run: HashSet::new(),
            cmd_stubs: StubSet::default(),
            ssh_stubs: StubSet::default(),
            kind,
        };

        if matches!(runner.kind, RunnerKind::Dry | RunnerKind::Tree(_)) {
            for stub in dry_tree_cmd_stubs {
                let output = stub.output.clone();
                runner.stub_cmd(stub.key(), move |spy: &LocalCmd| {
                    spy.set_stdout(output.stdout.clone());
                    spy.set_stderr(output.stderr.clone());
                    spy.set_exit_status(output.exit_status);
                });
            }
            for stub in dry_tree_ssh_stubs {
                let output = stub.output.clone();
                runner.stub_ssh(stub.key(), move |spy: &RemoteCmd| {
                    spy.set_stdout(output.stdout.clone());
                    spy.set_stderr(output.stderr.clone());
                    spy.set_exit_status(output.exit_status);
                });
            }
        }

        runner
    }

    pub fn kind(&self) -> &RunnerKind {
        &self.kind
    }

    pub fn registry(&self) -> &Rc<TaskRegistry> {
        &self.registry
    }

    pub fn ssh_config(&self) -> &SshConfig {
        &self.ssh
    }

    // -- params --

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Write a global param. Keys (and nested map keys) become strings.
    pub fn set_param(&mut self, key: impl std::fmt::Display, value: impl Serialize) -> Result<()> {
        self.params.insert(key, value)
    }

    // -- tasks --

    /// Top-level entry point.
    pub fn run(&mut self, name: &str, params: Params) -> Result<TaskHandle> {
        if matches!(self.kind, RunnerKind::Test(_)) {
            let mut handle = self.build_task(name, params)?;
            handle.dk_run(self)?;
            return Ok(handle);
        }
        if let RunnerKind::Tree(tree) = &mut self.kind {
            tree.begin_run();
        }
        self.build_and_run_task(name, params)
    }

    /// Run a sub-task or callback.
    pub fn run_task(&mut self, name: &str, params: Params) -> Result<TaskHandle> {
        if let RunnerKind::Test(runs) = &mut self.kind {
            runs.push(Run::Task(TaskRun::new(name, params.clone())));
            return self.build_task(name, params);
        }
        self.build_and_run_task(name, params)
    }

    pub fn has_run_task(&self, name: &str) -> bool {
        self.has_run.contains(name)
    }

    fn build_task(&self, name: &str, params: Params) -> Result<TaskHandle> {
        let def = self.registry.get(name)?;
        Ok(TaskHandle::new(def, params))
    }

    fn build_and_run_task(&mut self, name: &str, params: Params) -> Result<TaskHandle> {
        if let RunnerKind::Tree(tree) = &mut self.kind {
            tree.open(name, &params);
        }
        let result = self.dispatch_task(name, params);
        if let RunnerKind::Tree(tree) = &mut self.kind {
            tree.close();
        }
        result
    }

    fn dispatch_task(&mut self, name: &str, params: Params) -> Result<TaskHandle> {
        let mut handle = self.build_task(name, params)?;
        if handle.def().is_run_only_once() && self.has_run.contains(name) {
            debug!(task = %name, "run_only_once task already ran; skipping");
            return Ok(handle);
        }

        self.logger.debug(&format!("{TASK_START_PREFIX}{name}"));
        let started = Instant::now();
        let result = handle.dk_run(self);
        // A task that failed still counts as run.
        self.has_run.insert(name.to_string());
        self.logger.debug(&format!(
            "{TASK_END_PREFIX}{name} ({})",
            pretty_run_time(started.elapsed())
        ));

        result.map(|()| handle)
    }

    // -- callbacks --

    /// Register a callback for `subject` at run time.
    pub fn add_task_callback(
        &mut self,
        phase: Phase,
        subject: &str,
        callback: impl Into<TaskName>,
        params: Params,
    ) {
        self.callbacks
            .entry(subject.to_string())
            .or_default()
            .entry(phase)
            .or_default()
            .insert(Callback::new(callback, params));
    }

    /// Callbacks registered at run time for one phase of `task`.
    pub fn task_callbacks(&self, phase: Phase, task: &str) -> Vec<Callback> {
        self.callback_set(phase, task).to_vec()
    }

    pub fn task_callback_task_names(&self, phase: Phase, task: &str) -> Vec<TaskName> {
        self.callback_set(phase, task).task_names()
    }

    fn callback_set(&self, phase: Phase, task: &str) -> CallbackSet {
        self.callbacks
            .get(task)
            .and_then(|phases| phases.get(&phase))
            .cloned()
            .unwrap_or_default()
    }

    /// Effective callbacks for one side of a task: run-time prepends, then
    /// the task's own callbacks, then run-time callbacks, de-duplicated.
    pub fn resolved_callbacks(&self, direction: Direction, def: &TaskDef) -> CallbackSet {
        let (prepend, primary) = direction.phases();
        let mut set = self.callback_set(prepend, def.name());
        set.extend(def.direction_callbacks(direction));
        set.extend(self.callback_set(primary, def.name()));
        set
    }

    // -- commands --

    /// Build and run a local command.
    pub fn cmd(
        &mut self,
        task: TaskRef<'_>,
        cmd_str: &str,
        input: Option<&str>,
        opts: CmdOpts,
    ) -> Result<LocalCmd> {
        let cmd = self.build_local_cmd(task, cmd_str, input, opts)?;

        self.logger.info(&format!("{CMD_PREFIX}{cmd_str}"));
        self.run_logged(&cmd, input)?;

        self.record(Run::Cmd(cmd.clone()));
        Ok(cmd)
    }

    /// Build and start a local command without waiting for it.
    pub fn start(
        &mut self,
        task: TaskRef<'_>,
        cmd_str: &str,
        input: Option<&str>,
        opts: CmdOpts,
    ) -> Result<LocalCmd> {
        let cmd = self.build_local_cmd(task, cmd_str, input, opts)?;
        self.logger.info(&format!("{CMD_PREFIX}{cmd_str}"));
        cmd.start(input)?;
        self.record(Run::Cmd(cmd.clone()));
        Ok(cmd)
    }

    /// Build and run a remote command on every resolved host.
    pub fn ssh(
        &mut self,
        task: TaskRef<'_>,
        cmd_str: &str,
        input: Option<&str>,
        cmd_opts: CmdOpts,
        ssh_opts: SshOpts,
    ) -> Result<RemoteCmd> {
        let cmd = self.build_remote_cmd(task, cmd_str, input, cmd_opts, ssh_opts)?;

        self.logger.info(&format!("{SSH_PREFIX}{cmd_str}"));
        for (host, local) in cmd.local_cmds() {
            self.logger.debug(&format!("{INDENT}{}", local.cmd_str()));
            self.logger.info(&format!("{INDENT}[{host}]"));
        }
        self.run_logged(&cmd, input)?;

        self.record(Run::Ssh(cmd.clone()));
        Ok(cmd)
    }

    /// Run a built command, then log its run time and output lines.
    fn run_logged(&self, cmd: &impl Command, input: Option<&str>) -> Result<()> {
        let started = Instant::now();
        cmd.run(input)?;
        self.logger
            .info(&format!("{INDENT}({})", pretty_run_time(started.elapsed())));
        for line in cmd.output_lines() {
            let msg = match &line.host {
                Some(host) => format!("{INDENT}[{host}] {OUTPUT_PREFIX}{}", line.line),
                None => format!("{INDENT}{OUTPUT_PREFIX}{}", line.line),
            };
            self.logger.debug(&msg);
        }
        Ok(())
    }

    fn build_local_cmd(
        &mut self,
        task: TaskRef<'_>,
        cmd_str: &str,
        input: Option<&str>,
        opts: CmdOpts,
    ) -> Result<LocalCmd> {
        if !matches!(self.kind, RunnerKind::Live) {
            let view = TaskView::new(task.name, task.params, &self.params);
            let call = CallKey::new(cmd_str, input, &opts);
            let stubbed = self.cmd_stubs.lookup(&view, &call, || {
                Ok(LocalCmd::spy(cmd_str, opts.clone()))
            })?;
            if let Some(spy) = stubbed {
                return Ok(spy);
            }
        }

        let real = match &self.kind {
            RunnerKind::Live => true,
            RunnerKind::Dry | RunnerKind::Tree(_) => opts.dry_tree_run,
            RunnerKind::Test(_) => false,
        };
        Ok(if real {
            LocalCmd::new(cmd_str, opts)
        } else {
            LocalCmd::spy(cmd_str, opts)
        })
    }

    fn build_remote_cmd(
        &mut self,
        task: TaskRef<'_>,
        cmd_str: &str,
        input: Option<&str>,
        cmd_opts: CmdOpts,
        ssh_opts: SshOpts,
    ) -> Result<RemoteCmd> {
        if !matches!(self.kind, RunnerKind::Live) {
            let view = TaskView::new(task.name, task.params, &self.params);
            let call = CallKey::new(cmd_str, input, &cmd_opts);
            let stubbed = self.ssh_stubs.lookup(&view, &call, || {
                RemoteCmd::spy(cmd_str, ssh_opts.clone(), cmd_opts.clone())
            })?;
            if let Some(spy) = stubbed {
                return Ok(spy);
            }
        }

        let real = match &self.kind {
            RunnerKind::Live => true,
            RunnerKind::Dry | RunnerKind::Tree(_) => ssh_opts.dry_tree_run,
            RunnerKind::Test(_) => false,
        };
        if real {
            RemoteCmd::new(cmd_str, ssh_opts, cmd_opts)
        } else {
            RemoteCmd::spy(cmd_str, ssh_opts, cmd_opts)
        }
    }

    fn record(&mut self, run: Run) {
        if let RunnerKind::Test(runs) = &mut self.kind {
            runs.push(run);
        }
    }

    // -- stubs --

    pub fn stub_cmd<F>(&mut self, key: impl Into<StubKey>, block: F)
    where
        F: Fn(&LocalCmd) + 'static,
    {
        self.cmd_stubs.stub(key.into(), Rc::new(block));
    }

    pub fn unstub_cmd(&mut self, key: impl Into<StubKey>) {
        self.cmd_stubs.unstub(&key.into());
    }

    pub fn unstub_all_cmds(&mut self) {
        self.cmd_stubs.clear();
    }

    pub fn stub_ssh<F>(&mut self, key: impl Into<StubKey>, block: F)
    where
        F: Fn(&RemoteCmd) + 'static,
    {
        self.ssh_stubs.stub(key.into(), Rc::new(block));
    }

    pub fn unstub_ssh(&mut self, key: impl Into<StubKey>) {
        self.ssh_stubs.unstub(&key.into());
    }

    pub fn unstub_all_ssh(&mut self) {
        self.ssh_stubs.clear();
    }

    /// Number of registered local command stubs.
    pub fn cmd_stubs(&self) -> usize {
        self.cmd_stubs.len()
    }

    pub fn ssh_stubs(&self) -> usize {
        self.ssh_stubs.len()
    }

    // -- records --

    /// Everything a test runner recorded, in call order. Empty otherwise.
    pub fn runs(&self) -> &[Run] {
        match &self.kind {
            RunnerKind::Test(runs) => runs.as_slice(),
            _ => &[],
        }
    }

    /// Recorded task runs: sub-task dispatches of a test runner, or the
    /// latest tree of a tree runner.
    pub fn task_runs(&self) -> Vec<&TaskRun> {
        match &self.kind {
            RunnerKind::Test(runs) => runs.iter().filter_map(Run::as_task).collect(),
            RunnerKind::Tree(tree) => tree.roots().iter().collect(),
            _ => Vec::new(),
        }
    }

    /// The latest top-level run as an indented tree (tree runners only).
    pub fn render_tree(&self) -> Option<String> {
        match &self.kind {
            RunnerKind::Tree(tree) => Some(tree.render()),
            _ => None,
        }
    }

    // -- logging --

    pub fn log_info(&self, msg: &str) {
        self.logger.info(&format!("{INDENT}{msg}"));
    }

    pub fn log_debug(&self, msg: &str) {
        self.logger.debug(&format!("{INDENT}{msg}"));
    }

    pub fn log_error(&self, msg: &str) {
        self.logger.error(&format!("{INDENT}{msg}"));
    }

    /// Wrap a whole CLI invocation in banner lines and its run time.
    pub fn log_cli_run<T, F>(&mut self, argv: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        for _ in 0..CLI_BLANK_LINES {
            self.logger.debug("");
        }
        self.logger.debug(&rule('='));
        self.logger.debug(&format!("{} `{argv}`", rule('>')));
        self.logger.debug(&rule('='));

        let started = Instant::now();
        let result = f(self);

        self.logger
            .info(&format!("({})", pretty_run_time(started.elapsed())));
        self.logger.debug(&rule('='));
        self.logger.debug(&format!("{} `{argv}`", rule('<')));
        self.logger.debug(&rule('='));
        result
    }

    /// Wrap one task named on the command line.
    pub fn log_cli_task_run<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.logger.info(&format!("Starting `{name}`."));
        let started = Instant::now();
        let result = f(self);
        self.logger.info(&format!(
            "`{name}` finished in {}.",
            pretty_run_time(started.elapsed())
        ));
        self.logger.info("");
        self.logger.info("");
        result
    }
}
