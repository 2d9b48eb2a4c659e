#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use dk::config::{
    CallbackConfig, ConfigFile, RawConfigFile, StepConfig, StubConfig, TaskConfig,
};
use dk::errors::DkError;
use dk::exec::{Hosts, LocalCmd};
use dk::params::Params;
use dk::task::{RunResult, Task, TaskContext, TaskDef};

/// Shared, ordered record of what ran.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }
}

/// A configurable task body for tests.
///
/// On run it records its label, runs its commands, then halts or fails if
/// asked to, and finally records `<label>.end`.
#[derive(Debug, Clone)]
pub struct ProbeTask {
    label: String,
    log: CallLog,
    cmds: Vec<String>,
    sub_tasks: Vec<(String, Params)>,
    set_params: Vec<(String, serde_json::Value)>,
    halt: bool,
    fail: bool,
    /// Commands this instance ran, in order.
    pub ran: Vec<LocalCmd>,
}

impl ProbeTask {
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            cmds: Vec::new(),
            sub_tasks: Vec::new(),
            set_params: Vec::new(),
            halt: false,
            fail: false,
            ran: Vec::new(),
        }
    }

    pub fn cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmds.push(cmd.into());
        self
    }

    pub fn sub_task(mut self, name: impl Into<String>, params: Params) -> Self {
        self.sub_tasks.push((name.into(), params));
        self
    }

    pub fn set_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set_params.push((key.into(), value.into()));
        self
    }

    pub fn halt(mut self) -> Self {
        self.halt = true;
        self
    }

    pub fn fail(mut self) -> Self {
        self.fail = true;
        self
    }

    /// A task definition building a fresh copy of this probe per run.
    pub fn into_def(self, name: impl Into<String>) -> TaskDef {
        TaskDef::new(name, move || Box::new(self.clone()))
    }
}

impl Task for ProbeTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        self.log.push(self.label.clone());

        for (key, value) in &self.set_params {
            ctx.set_param(key, value)?;
        }
        for cmd in &self.cmds {
            let ran = ctx.cmd(cmd.as_str()).run()?;
            self.ran.push(ran);
        }
        for (name, params) in &self.sub_tasks {
            ctx.run_task(name, params.clone())?;
        }
        if self.halt {
            return ctx.halt();
        }
        if self.fail {
            return Err(DkError::Config(format!("{} failed on purpose", self.label)).into());
        }

        self.log.push(format!("{}.end", self.label));
        Ok(())
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.config
            .params
            .insert(key, value.into())
            .expect("param value should serialize");
        self
    }

    pub fn with_host_group(mut self, group: &str, hosts: &[&str]) -> Self {
        self.config.ssh.hosts.insert(
            group.to_string(),
            hosts.iter().map(|h| h.to_string()).collect(),
        );
        self
    }

    pub fn with_dry_tree_cmd_stub(mut self, cmd: &str, stdout: &str) -> Self {
        self.config.dry_tree.cmd.push(StubConfig {
            cmd: cmd.to_string(),
            stdout: stdout.to_string(),
            ..StubConfig::default()
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn desc(mut self, desc: &str) -> Self {
        self.task.description = Some(desc.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.run.push(StepConfig::Cmd {
            cmd: cmd.to_string(),
            input: None,
            env: BTreeMap::new(),
            dry_tree_run: false,
            check: true,
        });
        self
    }

    pub fn ssh(mut self, cmd: &str, hosts: Option<Hosts>) -> Self {
        self.task.run.push(StepConfig::Ssh {
            ssh: cmd.to_string(),
            hosts,
            input: None,
            env: BTreeMap::new(),
            dry_tree_run: false,
            check: true,
        });
        self
    }

    pub fn sub_task(mut self, task: &str) -> Self {
        self.task.run.push(StepConfig::Task {
            task: task.to_string(),
            params: Params::default(),
        });
        self
    }

    pub fn before(mut self, dep: &str) -> Self {
        self.task.before.push(CallbackConfig::Name(dep.to_string()));
        self
    }

    pub fn prepend_before(mut self, dep: &str) -> Self {
        self.task
            .prepend_before
            .push(CallbackConfig::Name(dep.to_string()));
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(CallbackConfig::Name(dep.to_string()));
        self
    }

    pub fn ssh_hosts(mut self, hosts: impl Into<Hosts>) -> Self {
        self.task.ssh_hosts = Some(hosts.into());
        self
    }

    pub fn run_only_once(mut self) -> Self {
        self.task.run_only_once = true;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
