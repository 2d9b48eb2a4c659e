// src/exec/local.rs

//! A single local command: one `sh -c` process, or a spy standing in for it.
//!
//! [`LocalCmd`] is a cheap, cloneable handle. Runners hand the same handle to
//! the calling task and keep it in their memo/records, so identity checks
//! ([`LocalCmd::ptr_eq`]) tell a test whether two dispatches produced the
//! exact same command.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::opts::CmdOpts;
use super::process::{CallRecord, Process, ProcessSpy, ShellProcess};
use crate::errors::Result;

/// Output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// One line of command output. `host` is set for remote commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub host: Option<String>,
    pub stream: Stream,
    pub line: String,
}

impl OutputLine {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            host: None,
            stream: Stream::Stdout,
            line: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            host: None,
            stream: Stream::Stderr,
            line: line.into(),
        }
    }

    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

#[derive(Debug)]
struct LocalInner {
    cmd_str: String,
    opts: CmdOpts,
    process: Process,
}

/// Handle to a local command.
#[derive(Debug, Clone)]
pub struct LocalCmd {
    inner: Rc<RefCell<LocalInner>>,
}

impl LocalCmd {
    /// A command that will really run `sh -c <cmd_str>`.
    pub fn new(cmd_str: impl Into<String>, opts: CmdOpts) -> Self {
        let cmd_str = cmd_str.into();
        let process = Process::Live(ShellProcess::new(cmd_str.clone(), opts.env.clone()));
        Self::with_process(cmd_str, opts, process)
    }

    /// A spy: records calls and reports programmed output, never spawns.
    pub fn spy(cmd_str: impl Into<String>, opts: CmdOpts) -> Self {
        Self::with_process(cmd_str.into(), opts, Process::Spy(ProcessSpy::default()))
    }

    fn with_process(cmd_str: String, opts: CmdOpts, process: Process) -> Self {
        Self {
            inner: Rc::new(RefCell::new(LocalInner {
                cmd_str,
                opts,
                process,
            })),
        }
    }

    pub fn cmd_str(&self) -> String {
        self.inner.borrow().cmd_str.clone()
    }

    pub fn opts(&self) -> CmdOpts {
        self.inner.borrow().opts.clone()
    }

    /// Start and wait.
    pub fn run(&self, input: Option<&str>) -> Result<()> {
        self.inner.borrow_mut().process.run(input)
    }

    /// Start without waiting; pair with [`LocalCmd::wait`].
    pub fn start(&self, input: Option<&str>) -> Result<()> {
        self.inner.borrow_mut().process.start(input)
    }

    pub fn wait(&self) -> Result<()> {
        self.inner.borrow_mut().process.wait()
    }

    pub fn stdout(&self) -> String {
        self.inner.borrow().process.stdout().to_string()
    }

    pub fn stderr(&self) -> String {
        self.inner.borrow().process.stderr().to_string()
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.inner.borrow().process.exit_status()
    }

    pub fn success(&self) -> bool {
        self.inner.borrow().process.success()
    }

    /// Why the process could not be spawned or waited on.
    pub fn failure(&self) -> Option<String> {
        self.inner.borrow().process.failure().map(str::to_string)
    }

    /// Stdout lines, then stderr lines. Each stream is trimmed first, so an
    /// empty stream contributes nothing.
    pub fn output_lines(&self) -> Vec<OutputLine> {
        let inner = self.inner.borrow();
        let mut lines = Vec::new();
        for (stream, text) in [
            (Stream::Stdout, inner.process.stdout()),
            (Stream::Stderr, inner.process.stderr()),
        ] {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            lines.extend(text.split('\n').map(|line| OutputLine {
                host: None,
                stream,
                line: line.trim_end_matches('\r').to_string(),
            }));
        }
        lines
    }

    pub fn is_spy(&self) -> bool {
        self.inner.borrow().process.as_spy().is_some()
    }

    // -- spy programming (no-ops on live commands) --

    pub fn set_stdout(&self, stdout: impl Into<String>) {
        if let Some(spy) = self.inner.borrow_mut().process.as_spy_mut() {
            spy.stdout = stdout.into();
        }
    }

    pub fn set_stderr(&self, stderr: impl Into<String>) {
        if let Some(spy) = self.inner.borrow_mut().process.as_spy_mut() {
            spy.stderr = stderr.into();
        }
    }

    pub fn set_exit_status(&self, status: i32) {
        if let Some(spy) = self.inner.borrow_mut().process.as_spy_mut() {
            spy.exit_status = status;
        }
    }

    // -- spy queries (empty on live commands) --

    pub fn run_calls(&self) -> Vec<CallRecord> {
        self.spy_calls(|spy| spy.run_calls.clone())
    }

    pub fn start_calls(&self) -> Vec<CallRecord> {
        self.spy_calls(|spy| spy.start_calls.clone())
    }

    pub fn run_called(&self) -> bool {
        !self.run_calls().is_empty()
    }

    pub fn start_called(&self) -> bool {
        !self.start_calls().is_empty()
    }

    pub fn wait_called(&self) -> bool {
        self.inner
            .borrow()
            .process
            .as_spy()
            .is_some_and(|spy| spy.wait_calls > 0)
    }

    /// Input given to the first `run` (or, failing that, `start`) call.
    pub fn run_input(&self) -> Option<String> {
        let inner = self.inner.borrow();
        let spy = inner.process.as_spy()?;
        spy.run_calls
            .first()
            .or_else(|| spy.start_calls.first())
            .and_then(|call| call.input.clone())
    }

    fn spy_calls(&self, f: impl FnOnce(&ProcessSpy) -> Vec<CallRecord>) -> Vec<CallRecord> {
        self.inner.borrow().process.as_spy().map(f).unwrap_or_default()
    }

    /// True if both handles point at the same command.
    pub fn ptr_eq(&self, other: &LocalCmd) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
