// src/runner/stubs.rs

//! Command stubs for dry, tree and test runs.
//!
//! A stub is keyed by `(cmd_str, input, opts)`. Any component may be
//! deferred: a closure evaluated against the calling task right before the
//! lookup. The first stub (newest first) whose resolved key equals the call
//! wins. On a hit the stub builds a spy once per resolved call, applies its
//! block to it, and hands back that same spy on every later identical call.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::errors::Result;
use crate::exec::CmdOpts;
use crate::params::TaskView;

/// A stub key component: a literal, or a function of the calling task.
pub enum StubArg<T> {
    Value(T),
    Deferred(Rc<dyn Fn(&TaskView<'_>) -> T>),
}

impl<T: Clone> StubArg<T> {
    pub fn resolve(&self, view: &TaskView<'_>) -> T {
        match self {
            StubArg::Value(value) => value.clone(),
            StubArg::Deferred(f) => f(view),
        }
    }
}

impl<T> Clone for StubArg<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            StubArg::Value(value) => StubArg::Value(value.clone()),
            StubArg::Deferred(f) => StubArg::Deferred(Rc::clone(f)),
        }
    }
}

/// Literal equality: equal values, or the very same closure.
impl<T: PartialEq> PartialEq for StubArg<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StubArg::Value(a), StubArg::Value(b)) => a == b,
            (StubArg::Deferred(a), StubArg::Deferred(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StubArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubArg::Value(value) => value.fmt(f),
            StubArg::Deferred(_) => f.write_str("<deferred>"),
        }
    }
}

/// What a stub matches on.
#[derive(Debug, Clone, PartialEq)]
pub struct StubKey {
    pub cmd_str: StubArg<String>,
    pub input: StubArg<Option<String>>,
    pub opts: StubArg<CmdOpts>,
}

impl StubKey {
    /// Match `cmd_str` called with no input and default opts.
    pub fn new(cmd_str: impl Into<String>) -> Self {
        Self {
            cmd_str: StubArg::Value(cmd_str.into()),
            input: StubArg::Value(None),
            opts: StubArg::Value(CmdOpts::default()),
        }
    }

    /// Match a command string computed from the calling task.
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&TaskView<'_>) -> String + 'static,
    {
        Self {
            cmd_str: StubArg::Deferred(Rc::new(f)),
            ..Self::new("")
        }
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = StubArg::Value(Some(input.into()));
        self
    }

    pub fn input_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskView<'_>) -> Option<String> + 'static,
    {
        self.input = StubArg::Deferred(Rc::new(f));
        self
    }

    pub fn opts(mut self, opts: CmdOpts) -> Self {
        self.opts = StubArg::Value(opts);
        self
    }

    pub fn opts_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskView<'_>) -> CmdOpts + 'static,
    {
        self.opts = StubArg::Deferred(Rc::new(f));
        self
    }

    pub fn resolve(&self, view: &TaskView<'_>) -> CallKey {
        CallKey {
            cmd_str: self.cmd_str.resolve(view),
            input: self.input.resolve(view),
            opts: self.opts.resolve(view),
        }
    }
}

impl From<&str> for StubKey {
    fn from(cmd_str: &str) -> Self {
        StubKey::new(cmd_str)
    }
}

impl From<String> for StubKey {
    fn from(cmd_str: String) -> Self {
        StubKey::new(cmd_str)
    }
}

/// A concrete command call, as dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub cmd_str: String,
    pub input: Option<String>,
    pub opts: CmdOpts,
}

impl CallKey {
    pub fn new(cmd_str: &str, input: Option<&str>, opts: &CmdOpts) -> Self {
        Self {
            cmd_str: cmd_str.to_string(),
            input: input.map(str::to_string),
            opts: opts.clone(),
        }
    }
}

/// Stub output loaded from config, applied to the spy on a hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CannedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// A stub installed into every dry or tree runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryTreeStub {
    pub cmd_str: String,
    pub input: Option<String>,
    pub opts: CmdOpts,
    pub output: CannedOutput,
}

impl DryTreeStub {
    pub fn key(&self) -> StubKey {
        let key = StubKey::new(self.cmd_str.clone()).opts(self.opts.clone());
        match &self.input {
            Some(input) => key.input(input.clone()),
            None => key,
        }
    }
}

struct Stub<H> {
    key: StubKey,
    block: Rc<dyn Fn(&H)>,
    spies: HashMap<CallKey, H>,
}

/// The stubs of one command kind (local or remote), newest first.
pub struct StubSet<H> {
    stubs: Vec<Stub<H>>,
}

impl<H> Default for StubSet<H> {
    fn default() -> Self {
        Self { stubs: Vec::new() }
    }
}

impl<H: Clone> StubSet<H> {
    /// Add a stub. An existing stub with the same literal key is replaced,
    /// dropping its spies.
    pub fn stub(&mut self, key: StubKey, block: Rc<dyn Fn(&H)>) {
        self.unstub(&key);
        self.stubs.insert(
            0,
            Stub {
                key,
                block,
                spies: HashMap::new(),
            },
        );
    }

    /// Remove the stub with this literal key and its spies. Unknown keys are
    /// ignored.
    pub fn unstub(&mut self, key: &StubKey) {
        self.stubs.retain(|stub| &stub.key != key);
    }

    pub fn clear(&mut self) {
        self.stubs.clear();
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    /// The spy for `call`, if a stub matches. `build` creates the spy the
    /// first time this resolved call is seen.
    pub fn lookup<F>(&mut self, view: &TaskView<'_>, call: &CallKey, build: F) -> Result<Option<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        let Some(idx) = self
            .stubs
            .iter()
            .position(|stub| stub.key.resolve(view) == *call)
        else {
            return Ok(None);
        };

        let stub = &mut self.stubs[idx];
        if let Some(spy) = stub.spies.get(call) {
            return Ok(Some(spy.clone()));
        }
        let spy = build()?;
        (stub.block)(&spy);
        stub.spies.insert(call.clone(), spy.clone());
        Ok(Some(spy))
    }
}

impl<H> fmt::Debug for StubSet<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stubs.iter().map(|stub| &stub.key))
            .finish()
    }
}
