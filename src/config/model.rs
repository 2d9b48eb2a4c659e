// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::exec::{CmdOpts, Hosts};
use crate::params::Params;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [params]
/// app = "web"
///
/// [ssh]
/// args = "-o ForwardAgent=yes"
/// [ssh.hosts]
/// web = ["web1.example.com", "web2.example.com"]
///
/// [task.deploy]
/// desc = "Deploy the app"
/// before = ["build"]
/// run = [{ ssh = "sudo systemctl restart app", hosts = "web" }]
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Initial runner params from `[params]`.
    #[serde(default)]
    pub params: Params,

    #[serde(default)]
    pub ssh: SshSection,

    #[serde(default)]
    pub log: LogSection,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    #[serde(default)]
    pub dry_tree: DryTreeSection,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub params: Params,
    pub ssh: SshSection,
    pub log: LogSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub dry_tree: DryTreeSection,
}

impl ConfigFile {
    /// Wrap a raw config without validating it.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            params: raw.params,
            ssh: raw.ssh,
            log: raw.log,
            task: raw.task,
            dry_tree: raw.dry_tree,
        }
    }
}

/// `[ssh]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshSection {
    #[serde(default)]
    pub args: String,

    /// Named host groups.
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,

    /// Extra ssh args for specific hosts.
    #[serde(default)]
    pub host_args: BTreeMap<String, String>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSection {
    /// Console level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: Option<String>,

    /// Also append debug-level logs to this file.
    pub file: Option<PathBuf>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    #[serde(default, alias = "desc")]
    pub description: Option<String>,

    #[serde(default)]
    pub run: Vec<StepConfig>,

    #[serde(default)]
    pub before: Vec<CallbackConfig>,

    #[serde(default)]
    pub prepend_before: Vec<CallbackConfig>,

    #[serde(default)]
    pub after: Vec<CallbackConfig>,

    #[serde(default)]
    pub prepend_after: Vec<CallbackConfig>,

    /// Default hosts for this task's ssh steps.
    pub ssh_hosts: Option<Hosts>,

    #[serde(default)]
    pub run_only_once: bool,
}

impl TaskConfig {
    /// Every task this task refers to: callbacks first, then `task` steps.
    pub fn referenced_tasks(&self) -> impl Iterator<Item = &str> {
        self.prepend_before
            .iter()
            .chain(&self.before)
            .chain(&self.after)
            .chain(&self.prepend_after)
            .map(CallbackConfig::task)
            .chain(self.run.iter().filter_map(|step| match step {
                StepConfig::Task { task, .. } => Some(task.as_str()),
                _ => None,
            }))
    }
}

/// A callback: a bare task name, or a task with params.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CallbackConfig {
    Name(String),
    WithParams {
        task: String,
        #[serde(default)]
        params: Params,
    },
}

impl CallbackConfig {
    pub fn task(&self) -> &str {
        match self {
            CallbackConfig::Name(task) => task,
            CallbackConfig::WithParams { task, .. } => task,
        }
    }

    pub fn params(&self) -> Params {
        match self {
            CallbackConfig::Name(_) => Params::default(),
            CallbackConfig::WithParams { params, .. } => params.clone(),
        }
    }
}

fn default_check() -> bool {
    true
}

/// One entry of a task's `run` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    Cmd {
        cmd: String,
        input: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        dry_tree_run: bool,
        #[serde(default = "default_check")]
        check: bool,
    },
    Ssh {
        ssh: String,
        hosts: Option<Hosts>,
        input: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        dry_tree_run: bool,
        #[serde(default = "default_check")]
        check: bool,
    },
    Task {
        task: String,
        #[serde(default)]
        params: Params,
    },
}

/// `[dry_tree]` section: canned command output for dry and tree runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DryTreeSection {
    #[serde(default)]
    pub cmd: Vec<StubConfig>,

    #[serde(default)]
    pub ssh: Vec<StubConfig>,
}

/// A `[[dry_tree.cmd]]` / `[[dry_tree.ssh]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StubConfig {
    pub cmd: String,
    pub input: Option<String>,
    /// ssh stubs only: the hosts the step names, if any.
    pub hosts: Option<Hosts>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub dry_tree_run: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_status: i32,
}

impl StubConfig {
    /// The call options this stub matches on.
    pub fn opts(&self) -> CmdOpts {
        CmdOpts {
            env: self.env.clone(),
            dry_tree_run: self.dry_tree_run,
            hosts: self.hosts.clone(),
            ..CmdOpts::default()
        }
    }
}
