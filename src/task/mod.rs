// src/task/mod.rs

//! Tasks: definitions, the registry, and the per-run lifecycle.
//!
//! A [`TaskDef`] is the registered, named description of a task type: its
//! description, its class-level callbacks for the four phases, an optional
//! default for ssh hosts, `run_only_once`, and a factory building the body.
//!
//! Each dispatch builds a fresh [`TaskHandle`] (definition + params + body)
//! and drives it through [`TaskHandle::dk_run`]:
//!
//! 1. before callbacks (each a full nested run),
//! 2. the body, where [`Interrupt::Halt`] ends the body early,
//! 3. after callbacks, which run even when the body halted.

pub mod callback;
pub mod context;
pub mod shell;

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::errors::{DkError, Result};
use crate::exec::Hosts;
use crate::params::{Params, TaskView};
use crate::runner::Runner;
use crate::types::{Direction, Phase, TaskName};

pub use callback::{Callback, CallbackSet};
pub use context::{CmdCall, SshCall, TaskContext};
pub use shell::{ShellTask, Step};

/// Why a task body stopped early.
#[derive(Debug)]
pub enum Interrupt {
    /// `halt` was called: the rest of the body is skipped, nothing failed.
    Halt,
    Failed(DkError),
}

impl From<DkError> for Interrupt {
    fn from(err: DkError) -> Self {
        Interrupt::Failed(err)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Failed(DkError::Other(err))
    }
}

/// Result of a task body.
pub type RunResult<T = ()> = std::result::Result<T, Interrupt>;

/// Upcast helper so handles can hand back the concrete task body.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The body of a task.
pub trait Task: AsAny {
    /// Do the task's work. Tasks that do not override this fail when run.
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        Err(DkError::NotImplemented(ctx.name().to_string()).into())
    }
}

/// Default hosts for a task's ssh commands.
#[derive(Clone)]
pub enum HostsSource {
    Value(Hosts),
    /// Evaluated against the calling task each time it is needed.
    Deferred(Rc<dyn Fn(&TaskView<'_>) -> Hosts>),
}

impl HostsSource {
    pub fn resolve(&self, view: &TaskView<'_>) -> Hosts {
        match self {
            HostsSource::Value(hosts) => hosts.clone(),
            HostsSource::Deferred(f) => f(view),
        }
    }
}

impl fmt::Debug for HostsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostsSource::Value(hosts) => f.debug_tuple("Value").field(hosts).finish(),
            HostsSource::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

type TaskFactory = Box<dyn Fn() -> Box<dyn Task>>;

/// A registered task type.
pub struct TaskDef {
    name: TaskName,
    description: Option<String>,
    callbacks: RefCell<HashMap<Phase, CallbackSet>>,
    ssh_hosts: Option<HostsSource>,
    run_only_once: bool,
    factory: TaskFactory,
}

impl TaskDef {
    pub fn new<F>(name: impl Into<TaskName>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Task> + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            callbacks: RefCell::new(HashMap::new()),
            ssh_hosts: None,
            run_only_once: false,
            factory: Box::new(factory),
        }
    }

    /// A definition whose body is `T::default()`.
    pub fn of<T: Task + Default + 'static>(name: impl Into<TaskName>) -> Self {
        Self::new(name, || Box::new(T::default()))
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn before(self, task: impl Into<TaskName>) -> Self {
        self.callback(Phase::Before, task, Params::default())
    }

    pub fn prepend_before(self, task: impl Into<TaskName>) -> Self {
        self.callback(Phase::PrependBefore, task, Params::default())
    }

    pub fn after(self, task: impl Into<TaskName>) -> Self {
        self.callback(Phase::After, task, Params::default())
    }

    pub fn prepend_after(self, task: impl Into<TaskName>) -> Self {
        self.callback(Phase::PrependAfter, task, Params::default())
    }

    /// Add a class-level callback with params.
    pub fn callback(self, phase: Phase, task: impl Into<TaskName>, params: Params) -> Self {
        self.add_callback(phase, Callback::new(task, params));
        self
    }

    pub fn ssh_hosts(mut self, hosts: impl Into<Hosts>) -> Self {
        self.ssh_hosts = Some(HostsSource::Value(hosts.into()));
        self
    }

    pub fn ssh_hosts_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskView<'_>) -> Hosts + 'static,
    {
        self.ssh_hosts = Some(HostsSource::Deferred(Rc::new(f)));
        self
    }

    pub fn run_only_once(mut self, value: bool) -> Self {
        self.run_only_once = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_run_only_once(&self) -> bool {
        self.run_only_once
    }

    pub fn default_ssh_hosts(&self) -> Option<&HostsSource> {
        self.ssh_hosts.as_ref()
    }

    /// Class-level callbacks for one phase.
    pub fn callbacks(&self, phase: Phase) -> CallbackSet {
        self.callbacks
            .borrow()
            .get(&phase)
            .cloned()
            .unwrap_or_default()
    }

    /// Class-level callbacks for a direction: prepend phase, then primary.
    pub fn direction_callbacks(&self, direction: Direction) -> CallbackSet {
        let (prepend, primary) = direction.phases();
        let mut set = self.callbacks(prepend);
        set.extend(self.callbacks(primary));
        set
    }

    /// Append a class-level callback; duplicates are dropped.
    pub fn add_callback(&self, phase: Phase, callback: Callback) -> bool {
        self.callbacks
            .borrow_mut()
            .entry(phase)
            .or_default()
            .insert(callback)
    }

    fn build(&self) -> Box<dyn Task> {
        (self.factory)()
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("callbacks", &self.callbacks.borrow())
            .field("ssh_hosts", &self.ssh_hosts)
            .field("run_only_once", &self.run_only_once)
            .finish_non_exhaustive()
    }
}

/// Name → definition.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, Rc<TaskDef>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any earlier one with the same name.
    pub fn register(&mut self, def: TaskDef) -> &mut Self {
        self.tasks.insert(def.name.clone(), Rc::new(def));
        self
    }

    pub fn get(&self, name: &str) -> Result<Rc<TaskDef>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| DkError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn defs(&self) -> impl Iterator<Item = &Rc<TaskDef>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Append a class-level callback to an already registered task.
    pub fn add_callback(
        &self,
        phase: Phase,
        subject: &str,
        callback: impl Into<TaskName>,
        params: Params,
    ) -> Result<bool> {
        Ok(self
            .get(subject)?
            .add_callback(phase, Callback::new(callback, params)))
    }
}

/// One task instance: built per dispatch, dropped once the run returns.
pub struct TaskHandle {
    def: Rc<TaskDef>,
    params: Params,
    body: Box<dyn Task>,
}

impl TaskHandle {
    pub fn new(def: Rc<TaskDef>, params: Params) -> Self {
        let body = def.build();
        Self { def, params, body }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &Rc<TaskDef> {
        &self.def
    }

    /// The task-local params this instance was built with.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The concrete body, if it is a `T`.
    pub fn downcast_ref<T: Task + 'static>(&self) -> Option<&T> {
        (*self.body).as_any().downcast_ref::<T>()
    }

    /// Run the before callbacks, the body and the after callbacks.
    pub fn dk_run(&mut self, runner: &mut Runner) -> Result<()> {
        for callback in runner.resolved_callbacks(Direction::Before, &self.def) {
            runner.run_task(&callback.task, callback.params)?;
        }

        let mut ctx = TaskContext::new(runner, &self.def, &self.params);
        match self.body.run(&mut ctx) {
            Ok(()) | Err(Interrupt::Halt) => {}
            Err(Interrupt::Failed(err)) => return Err(err),
        }

        for callback in runner.resolved_callbacks(Direction::After, &self.def) {
            runner.run_task(&callback.task, callback.params)?;
        }
        Ok(())
    }
}

/// Handles compare by task name only; params are not part of identity.
impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.def.name == other.def.name
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.def.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
