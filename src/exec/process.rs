// src/exec/process.rs

//! The process primitive behind every command.
//!
//! A [`Process`] is either a live `sh -c` child driven by `tokio::process`,
//! or a [`ProcessSpy`] that records calls and replays programmed output.
//! Both support "start now, wait later": remote commands start one process
//! per host and only then wait on all of them.
//!
//! Live processes run on a small shared multi-threaded runtime, so the
//! stdin writer and the stdout/stderr readers make progress while the
//! calling thread is busy starting other hosts. Waiting blocks the calling
//! thread on that runtime, so the engine must be driven from sync code.

use std::collections::BTreeMap;
use std::io;
use std::process::{Output, Stdio};
use std::sync::OnceLock;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::{DkError, Result};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> io::Result<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("dk-process")
        .enable_all()
        .build()?;
    Ok(RUNTIME.get_or_init(|| rt))
}

// `block_on` panics when called from a runtime thread.
fn ensure_sync(cmd_str: &str) -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(DkError::AsyncContext(cmd_str.to_string()));
    }
    Ok(())
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the process was killed by a signal.
    pub exit_status: Option<i32>,
}

impl From<Output> for Captured {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code(),
        }
    }
}

#[derive(Debug, Default)]
enum ShellState {
    #[default]
    Idle,
    Running(JoinHandle<io::Result<Output>>),
    Finished(Captured),
    /// Spawning or waiting failed; holds the reason.
    Failed(String),
}

/// A live `sh -c <cmd>` process.
#[derive(Debug)]
pub struct ShellProcess {
    cmd_str: String,
    env: BTreeMap<String, String>,
    state: ShellState,
}

impl ShellProcess {
    pub fn new(cmd_str: impl Into<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            cmd_str: cmd_str.into(),
            env,
            state: ShellState::Idle,
        }
    }

    /// Spawn the process without waiting for it.
    ///
    /// Starting a process that is still running is an error; the running
    /// child stays attached and can still be waited on.
    pub fn start(&mut self, input: Option<&str>) -> Result<()> {
        if matches!(self.state, ShellState::Running(_)) {
            return Err(DkError::AlreadyRunning(self.cmd_str.clone()));
        }
        ensure_sync(&self.cmd_str)?;
        let rt = runtime()?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.cmd_str)
            .envs(&self.env)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawned = {
            let _guard = rt.enter();
            cmd.spawn()
        };
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return Err(self.fail(e.to_string())),
        };
        debug!(cmd = %self.cmd_str, pid = ?child.id(), "spawned process");

        let stdin = child.stdin.take();
        let input = input.map(|s| s.as_bytes().to_vec());

        let handle = rt.spawn(async move {
            let feed = async {
                if let (Some(mut stdin), Some(input)) = (stdin, input) {
                    // A child that exits without reading its input closes the
                    // pipe; that is not a failure of the command itself.
                    match stdin.write_all(&input).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            };
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        });

        self.state = ShellState::Running(handle);
        Ok(())
    }

    /// Block until the process exits and capture its output.
    pub fn wait(&mut self) -> Result<()> {
        if !matches!(self.state, ShellState::Running(_)) {
            return Ok(());
        }
        ensure_sync(&self.cmd_str)?;
        let rt = runtime()?;
        let ShellState::Running(handle) = std::mem::take(&mut self.state) else {
            return Ok(());
        };
        match rt.block_on(handle) {
            Ok(Ok(output)) => {
                self.state = ShellState::Finished(output.into());
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e.to_string())),
            Err(e) => Err(self.fail(e.to_string())),
        }
    }

    fn fail(&mut self, reason: String) -> DkError {
        self.state = ShellState::Failed(reason.clone());
        DkError::Process {
            cmd: self.cmd_str.clone(),
            reason,
        }
    }

    /// Why spawning or waiting failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            ShellState::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn run(&mut self, input: Option<&str>) -> Result<()> {
        self.start(input)?;
        self.wait()
    }

    fn captured(&self) -> Option<&Captured> {
        match &self.state {
            ShellState::Finished(captured) => Some(captured),
            _ => None,
        }
    }
}

/// A recorded `start` / `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub input: Option<String>,
}

/// Stand-in process: records how it was driven, never spawns anything.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpy {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
    pub run_calls: Vec<CallRecord>,
    pub start_calls: Vec<CallRecord>,
    pub wait_calls: usize,
}

impl ProcessSpy {
    pub fn start(&mut self, input: Option<&str>) {
        self.start_calls.push(CallRecord {
            input: input.map(str::to_string),
        });
    }

    pub fn wait(&mut self) {
        self.wait_calls += 1;
    }

    pub fn run(&mut self, input: Option<&str>) {
        self.run_calls.push(CallRecord {
            input: input.map(str::to_string),
        });
    }
}

/// Either a live process or a spy.
#[derive(Debug)]
pub enum Process {
    Live(ShellProcess),
    Spy(ProcessSpy),
}

impl Process {
    pub fn start(&mut self, input: Option<&str>) -> Result<()> {
        match self {
            Process::Live(p) => p.start(input),
            Process::Spy(s) => {
                s.start(input);
                Ok(())
            }
        }
    }

    pub fn wait(&mut self) -> Result<()> {
        match self {
            Process::Live(p) => p.wait(),
            Process::Spy(s) => {
                s.wait();
                Ok(())
            }
        }
    }

    pub fn run(&mut self, input: Option<&str>) -> Result<()> {
        match self {
            Process::Live(p) => p.run(input),
            Process::Spy(s) => {
                s.run(input);
                Ok(())
            }
        }
    }

    pub fn stdout(&self) -> &str {
        match self {
            Process::Live(p) => p.captured().map(|c| c.stdout.as_str()).unwrap_or(""),
            Process::Spy(s) => &s.stdout,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            Process::Live(p) => p.captured().map(|c| c.stderr.as_str()).unwrap_or(""),
            Process::Spy(s) => &s.stderr,
        }
    }

    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Process::Live(p) => p.captured().and_then(|c| c.exit_status),
            Process::Spy(s) => Some(s.exit_status),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status() == Some(0)
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Process::Live(p) => p.failure(),
            Process::Spy(_) => None,
        }
    }

    pub fn as_spy(&self) -> Option<&ProcessSpy> {
        match self {
            Process::Spy(s) => Some(s),
            Process::Live(_) => None,
        }
    }

    pub fn as_spy_mut(&mut self) -> Option<&mut ProcessSpy> {
        match self {
            Process::Spy(s) => Some(s),
            Process::Live(_) => None,
        }
    }
}
