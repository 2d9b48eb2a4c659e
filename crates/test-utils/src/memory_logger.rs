use std::cell::RefCell;
use std::rc::Rc;

use dk::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Debug,
    Error,
}

/// A logger that keeps every line in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a runner
/// and inspect the lines through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    lines: Rc<RefCell<Vec<(Level, String)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A boxed clone, ready for `RunnerOptions::logger`.
    pub fn boxed(&self) -> Option<Box<dyn Logger>> {
        Some(Box::new(self.clone()))
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.borrow().clone()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.at(Level::Info)
    }

    pub fn debugs(&self) -> Vec<String> {
        self.at(Level::Debug)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(Level::Error)
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }

    fn push(&self, level: Level, msg: &str) {
        self.lines.borrow_mut().push((level, msg.to_string()));
    }
}

impl Logger for MemoryLogger {
    fn info(&self, msg: &str) {
        self.push(Level::Info, msg);
    }

    fn debug(&self, msg: &str) {
        self.push(Level::Debug, msg);
    }

    fn error(&self, msg: &str) {
        self.push(Level::Error, msg);
    }
}
