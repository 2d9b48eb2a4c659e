// src/exec/remote.rs

//! Remote commands: one local `ssh` process per target host.
//!
//! The command string is collapsed, escaped and wrapped in `sh -c` so the
//! remote login shell loads the user's full profile:
//!
//! ```text
//! ssh <ssh_args> <host_ssh_args> <host> -- "sh -c \"<cmd>\""
//! ```
//!
//! Running a remote command starts every host's process before waiting on
//! any of them, so hosts run in parallel while the caller blocks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::local::{LocalCmd, OutputLine};
use super::opts::{CmdOpts, SshOpts};
use super::process::CallRecord;
use crate::errors::{DkError, Result};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Build the local `ssh` command line that runs `cmd_str` on `host`.
pub fn ssh_cmd_str(
    cmd_str: &str,
    host: &str,
    args: &str,
    host_args: &BTreeMap<String, String>,
) -> String {
    let collapsed = WHITESPACE.replace_all(cmd_str, " ");
    let val = format!("\"{collapsed}\"")
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    let host_args = host_args.get(host).map(String::as_str).unwrap_or("");
    format!("ssh {args} {host_args} {host} -- \"sh -c {val}\"")
}

#[derive(Debug)]
struct RemoteInner {
    cmd_str: String,
    hosts: Vec<String>,
    ssh_args: String,
    host_ssh_args: BTreeMap<String, String>,
    /// Options the command was dispatched with (the stub key component).
    cmd_opts: CmdOpts,
    local_cmds: BTreeMap<String, LocalCmd>,
}

/// Handle to a remote command.
#[derive(Debug, Clone)]
pub struct RemoteCmd {
    inner: Rc<RefCell<RemoteInner>>,
}

impl RemoteCmd {
    /// A remote command whose per-host processes really run `ssh`.
    pub fn new(cmd_str: impl Into<String>, opts: SshOpts, cmd_opts: CmdOpts) -> Result<Self> {
        Self::build(cmd_str.into(), opts, cmd_opts, |s, o| LocalCmd::new(s, o))
    }

    /// A remote spy; each host gets a local spy.
    pub fn spy(cmd_str: impl Into<String>, opts: SshOpts, cmd_opts: CmdOpts) -> Result<Self> {
        Self::build(cmd_str.into(), opts, cmd_opts, |s, o| LocalCmd::spy(s, o))
    }

    fn build(
        cmd_str: String,
        opts: SshOpts,
        cmd_opts: CmdOpts,
        local: fn(String, CmdOpts) -> LocalCmd,
    ) -> Result<Self> {
        let mut hosts = match opts.hosts.as_ref() {
            Some(hosts) if !hosts.is_empty() && hosts.iter().all(|h| !h.trim().is_empty()) => {
                hosts.clone()
            }
            other => return Err(DkError::NoHosts(format!("{other:?}"))),
        };
        hosts.sort();
        hosts.dedup();

        let local_opts = opts.local_opts();
        let local_cmds = hosts
            .iter()
            .map(|host| {
                let ssh = ssh_cmd_str(&cmd_str, host, &opts.ssh_args, &opts.host_ssh_args);
                (host.clone(), local(ssh, local_opts.clone()))
            })
            .collect();

        Ok(Self {
            inner: Rc::new(RefCell::new(RemoteInner {
                cmd_str,
                hosts,
                ssh_args: opts.ssh_args,
                host_ssh_args: opts.host_ssh_args,
                cmd_opts,
                local_cmds,
            })),
        })
    }

    pub fn cmd_str(&self) -> String {
        self.inner.borrow().cmd_str.clone()
    }

    /// Target hosts, sorted.
    pub fn hosts(&self) -> Vec<String> {
        self.inner.borrow().hosts.clone()
    }

    pub fn ssh_args(&self) -> String {
        self.inner.borrow().ssh_args.clone()
    }

    pub fn host_ssh_args(&self) -> BTreeMap<String, String> {
        self.inner.borrow().host_ssh_args.clone()
    }

    pub fn cmd_opts(&self) -> CmdOpts {
        self.inner.borrow().cmd_opts.clone()
    }

    /// The per-host local commands, keyed by host.
    pub fn local_cmds(&self) -> BTreeMap<String, LocalCmd> {
        self.inner.borrow().local_cmds.clone()
    }

    /// The full `ssh ...` command line used for `host`.
    pub fn ssh_cmd_str(&self, host: &str) -> Option<String> {
        self.inner.borrow().local_cmds.get(host).map(LocalCmd::cmd_str)
    }

    /// Start every host, then wait on every host.
    pub fn run(&self, input: Option<&str>) -> Result<()> {
        let cmds: Vec<LocalCmd> = self.inner.borrow().local_cmds.values().cloned().collect();
        for (started, cmd) in cmds.iter().enumerate() {
            if let Err(e) = cmd.start(input) {
                // Reap the hosts already running before reporting.
                for cmd in &cmds[..started] {
                    let _ = cmd.wait();
                }
                return Err(e);
            }
        }
        debug!(cmd = %self.cmd_str(), hosts = cmds.len(), "started remote command on all hosts");
        for cmd in &cmds {
            cmd.wait()?;
        }
        Ok(())
    }

    /// True only if every host succeeded.
    pub fn success(&self) -> bool {
        self.inner.borrow().local_cmds.values().all(LocalCmd::success)
    }

    /// Every host's output lines, tagged with the host, in host order.
    pub fn output_lines(&self) -> Vec<OutputLine> {
        self.inner
            .borrow()
            .local_cmds
            .iter()
            .flat_map(|(host, cmd)| {
                cmd.output_lines()
                    .into_iter()
                    .map(move |line| line.on_host(host.clone()))
            })
            .collect()
    }

    pub fn is_spy(&self) -> bool {
        self.first().is_some_and(|cmd| cmd.is_spy())
    }

    pub fn is_ssh(&self) -> bool {
        true
    }

    // Spy programming and queries go to the first host; a remote command is
    // started on every host or on none.

    fn first(&self) -> Option<LocalCmd> {
        self.inner.borrow().local_cmds.values().next().cloned()
    }

    pub fn set_stdout(&self, stdout: impl Into<String>) {
        if let Some(cmd) = self.first() {
            cmd.set_stdout(stdout);
        }
    }

    pub fn set_stderr(&self, stderr: impl Into<String>) {
        if let Some(cmd) = self.first() {
            cmd.set_stderr(stderr);
        }
    }

    pub fn set_exit_status(&self, status: i32) {
        if let Some(cmd) = self.first() {
            cmd.set_exit_status(status);
        }
    }

    pub fn run_calls(&self) -> Vec<CallRecord> {
        self.first().map(|cmd| cmd.start_calls()).unwrap_or_default()
    }

    pub fn run_called(&self) -> bool {
        !self.run_calls().is_empty()
    }

    pub fn run_input(&self) -> Option<String> {
        self.run_calls().into_iter().next().and_then(|call| call.input)
    }

    pub fn ptr_eq(&self, other: &RemoteCmd) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
