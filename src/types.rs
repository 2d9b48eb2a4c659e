// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// The four callback phases a task can have callbacks registered for.
///
/// - `PrependBefore` / `Before` run ahead of the task body, prepend first.
/// - `PrependAfter` / `After` run once the body returned (or halted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PrependBefore,
    Before,
    PrependAfter,
    After,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::PrependBefore,
        Phase::Before,
        Phase::PrependAfter,
        Phase::After,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PrependBefore => "prepend_before",
            Phase::Before => "before",
            Phase::PrependAfter => "prepend_after",
            Phase::After => "after",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Phase::PrependBefore | Phase::Before => Direction::Before,
            Phase::PrependAfter | Phase::After => Direction::After,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prepend_before" => Ok(Phase::PrependBefore),
            "before" => Ok(Phase::Before),
            "prepend_after" => Ok(Phase::PrependAfter),
            "after" => Ok(Phase::After),
            other => Err(format!(
                "invalid callback phase: {other} (expected \"before\", \"prepend_before\", \"after\" or \"prepend_after\")"
            )),
        }
    }
}

/// Which side of the task body a callback chain runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Before,
    After,
}

impl Direction {
    /// The (prepend, primary) phases making up this direction.
    pub fn phases(self) -> (Phase, Phase) {
        match self {
            Direction::Before => (Phase::PrependBefore, Phase::Before),
            Direction::After => (Phase::PrependAfter, Phase::After),
        }
    }
}
