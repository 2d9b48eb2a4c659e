// src/task/callback.rs

//! Callbacks and ordered, de-duplicated callback sets.

use crate::params::Params;
use crate::types::TaskName;

/// A task scheduled to run before or after another task.
///
/// Two callbacks are equal when they name the same task with the same params.
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    pub task: TaskName,
    pub params: Params,
}

impl Callback {
    pub fn new(task: impl Into<TaskName>, params: Params) -> Self {
        Self {
            task: task.into(),
            params,
        }
    }
}

impl From<&str> for Callback {
    fn from(task: &str) -> Self {
        Self::new(task, Params::default())
    }
}

/// Insertion-ordered callbacks; a structurally equal duplicate is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackSet {
    items: Vec<Callback>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an equal callback is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, callback: Callback) -> bool {
        if self.items.contains(&callback) {
            return false;
        }
        self.items.push(callback);
        true
    }

    /// Append every callback of `other` that is not already present.
    pub fn extend<I: IntoIterator<Item = Callback>>(&mut self, other: I) {
        for callback in other {
            self.insert(callback);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Callback> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Callback> {
        self.items.clone()
    }

    /// Names of the callback tasks, in order.
    pub fn task_names(&self) -> Vec<TaskName> {
        self.items.iter().map(|cb| cb.task.clone()).collect()
    }
}

impl FromIterator<Callback> for CallbackSet {
    fn from_iter<I: IntoIterator<Item = Callback>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for CallbackSet {
    type Item = Callback;
    type IntoIter = std::vec::IntoIter<Callback>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a CallbackSet {
    type Item = &'a Callback;
    type IntoIter = std::slice::Iter<'a, Callback>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
