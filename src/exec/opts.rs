// src/exec/opts.rs

//! Options accepted by `cmd` / `ssh` calls.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Hosts an ssh command should run on, before group resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum Hosts {
    /// A named host group, or a single host name if no such group exists.
    Named(String),
    /// An explicit host list.
    List(Vec<String>),
}

impl Hosts {
    /// Resolve against the configured host groups.
    pub fn resolve(&self, groups: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        match self {
            Hosts::Named(name) => groups
                .get(name)
                .cloned()
                .unwrap_or_else(|| vec![name.clone()]),
            Hosts::List(hosts) => hosts.clone(),
        }
    }
}

impl From<&str> for Hosts {
    fn from(name: &str) -> Self {
        Hosts::Named(name.to_string())
    }
}

impl From<String> for Hosts {
    fn from(name: String) -> Self {
        Hosts::Named(name)
    }
}

impl From<Vec<String>> for Hosts {
    fn from(hosts: Vec<String>) -> Self {
        Hosts::List(hosts)
    }
}

impl From<&[&str]> for Hosts {
    fn from(hosts: &[&str]) -> Self {
        Hosts::List(hosts.iter().map(|h| h.to_string()).collect())
    }
}

/// Options given at a `cmd` / `ssh` call site.
///
/// These are also the third component of a stub key, so they are compared
/// structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CmdOpts {
    /// Environment overrides for the spawned process.
    pub env: BTreeMap<String, String>,
    /// Force real execution even under a dry or tree runner.
    pub dry_tree_run: bool,
    /// ssh only: hosts, overriding the task's declared default.
    pub hosts: Option<Hosts>,
    /// ssh only: overrides the runner's ssh args.
    pub ssh_args: Option<String>,
    /// ssh only: overrides the runner's per-host ssh args.
    pub host_ssh_args: Option<BTreeMap<String, String>>,
}

impl CmdOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn dry_tree_run(mut self, value: bool) -> Self {
        self.dry_tree_run = value;
        self
    }

    pub fn hosts(mut self, hosts: impl Into<Hosts>) -> Self {
        self.hosts = Some(hosts.into());
        self
    }

    pub fn ssh_args(mut self, args: impl Into<String>) -> Self {
        self.ssh_args = Some(args.into());
        self
    }

    pub fn host_ssh_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.host_ssh_args = Some(args);
        self
    }
}

/// Fully resolved options a remote command is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshOpts {
    /// `None` when nothing resolved any hosts; remote construction rejects it.
    pub hosts: Option<Vec<String>>,
    pub ssh_args: String,
    pub host_ssh_args: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub dry_tree_run: bool,
}

impl SshOpts {
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: Some(hosts.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Options for each host's local ssh process.
    pub fn local_opts(&self) -> CmdOpts {
        CmdOpts {
            env: self.env.clone(),
            dry_tree_run: self.dry_tree_run,
            ..CmdOpts::default()
        }
    }
}
