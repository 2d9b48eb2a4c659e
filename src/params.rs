// src/params.rs

//! Task parameters and the two-level param scope.
//!
//! Params are string-keyed maps of JSON values. Every write path goes through
//! `serde_json`, which is what normalizes keys: top-level keys are rendered
//! with `Display`, nested map keys (integers, chars, ...) come out as strings,
//! arrays and maps are normalized depth-first and scalars are left untouched.
//!
//! Reads go through [`TaskView`]: the task-local overlay first, then the
//! runner-global map. A strict miss is a [`DkError::NoParam`]; there is no
//! implicit default.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DkError, Result};

/// A string-keyed map of param values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for values that convert into JSON infallibly.
    pub fn with(mut self, key: impl fmt::Display, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Build params from any serializable map-like value (`null` is empty).
    pub fn from_serialize<T: Serialize>(value: T) -> Result<Self> {
        match normalize(value)? {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            Value::Null => Ok(Self::default()),
            other => Err(DkError::Config(format!(
                "params must be a map, got `{other}`"
            ))),
        }
    }

    /// Insert a value, normalizing the key and any nested map keys.
    pub fn insert(&mut self, key: impl fmt::Display, value: impl Serialize) -> Result<()> {
        let value = normalize(value)?;
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overwrite entries with the ones from `other`.
    pub fn merge(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Convert any serializable value into a normalized param value.
pub fn normalize<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Render a param value the way it would be interpolated into a command:
/// strings without quotes, everything else as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read-only view of the params visible to one task.
#[derive(Debug, Clone, Copy)]
pub struct TaskView<'a> {
    name: &'a str,
    local: &'a Params,
    global: &'a Params,
}

impl<'a> TaskView<'a> {
    pub fn new(name: &'a str, local: &'a Params, global: &'a Params) -> Self {
        Self { name, local, global }
    }

    /// Name of the task this view belongs to.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Two-level lookup: task-local overlay, then the runner-global map.
    pub fn lookup(&self, key: &str) -> Option<&'a Value> {
        self.local.get(key).or_else(|| self.global.get(key))
    }

    /// Strict read; a miss at both levels is an error.
    pub fn param(&self, key: &str) -> Result<&'a Value> {
        self.lookup(key)
            .ok_or_else(|| DkError::NoParam(key.to_string()))
    }

    pub fn try_param(&self, key: &str) -> Option<&'a Value> {
        self.lookup(key)
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Strict read deserialized into `T`.
    pub fn param_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.param(key)?;
        Ok(T::deserialize(value)?)
    }

    /// Soft read rendered as a string (see [`value_to_string`]).
    pub fn try_str(&self, key: &str) -> Option<String> {
        self.lookup(key).map(value_to_string)
    }
}
