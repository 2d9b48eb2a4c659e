// src/runner/runs.rs

//! Records of what a runner did: task runs (tree and test mode) and the
//! commands a test runner saw, plus the tree renderer.

use crate::exec::{LocalCmd, RemoteCmd};
use crate::params::Params;
use crate::types::TaskName;

const LEVEL_PREFIX: &str = "    ";
const LEVEL_BULLET: &str = "|-- ";

/// One recorded dispatch.
#[derive(Debug, Clone)]
pub enum Run {
    Task(TaskRun),
    Cmd(LocalCmd),
    Ssh(RemoteCmd),
}

impl Run {
    pub fn as_task(&self) -> Option<&TaskRun> {
        match self {
            Run::Task(run) => Some(run),
            _ => None,
        }
    }

    pub fn as_cmd(&self) -> Option<&LocalCmd> {
        match self {
            Run::Cmd(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn as_ssh(&self) -> Option<&RemoteCmd> {
        match self {
            Run::Ssh(cmd) => Some(cmd),
            _ => None,
        }
    }
}

/// A task dispatch and everything it dispatched in turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub task: TaskName,
    pub params: Params,
    pub runs: Vec<TaskRun>,
}

impl TaskRun {
    pub fn new(task: impl Into<TaskName>, params: Params) -> Self {
        Self {
            task: task.into(),
            params,
            runs: Vec::new(),
        }
    }
}

/// Tree-mode bookkeeping: the open task runs, innermost last.
#[derive(Debug, Default)]
pub struct TreeState {
    run_num: usize,
    roots: Vec<TaskRun>,
    stack: Vec<TaskRun>,
}

impl TreeState {
    /// Forget the previous top-level run and start numbering the next one.
    pub fn begin_run(&mut self) {
        self.roots.clear();
        self.stack.clear();
        self.run_num += 1;
    }

    pub fn open(&mut self, task: &str, params: &Params) {
        self.stack.push(TaskRun::new(task, params.clone()));
    }

    pub fn close(&mut self) {
        let Some(done) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(parent) => parent.runs.push(done),
            None => self.roots.push(done),
        }
    }

    pub fn run_num(&self) -> usize {
        self.run_num
    }

    /// Task runs of the latest top-level run.
    pub fn roots(&self) -> &[TaskRun] {
        &self.roots
    }

    /// Render the latest top-level run, one task per line.
    pub fn render(&self) -> String {
        let root_prefix = format!("{:>width$}", format!("{}) ", self.run_num), width = LEVEL_PREFIX.len());
        let mut out = String::new();
        render_runs(&mut out, &self.roots, 0, &root_prefix);
        out
    }
}

fn render_runs(out: &mut String, runs: &[TaskRun], level: usize, prefix: &str) {
    for run in runs {
        out.push_str(&LEVEL_PREFIX.repeat(level));
        if level > 0 {
            out.push_str(LEVEL_BULLET);
        }
        out.push_str(prefix);
        out.push_str(&run.task);
        out.push('\n');
        render_runs(out, &run.runs, level + 1, "");
    }
}
