// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DkError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DkError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Check a raw config: every referenced task exists, no task refers to
/// itself, and callbacks plus `task` steps form no cycle.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_task_references(cfg)?;
    validate_log_level(cfg)?;
    validate_acyclic(cfg)?;
    Ok(())
}

fn validate_task_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.referenced_tasks() {
            if !cfg.task.contains_key(dep) {
                return Err(DkError::Config(format!(
                    "task '{}' refers to unknown task '{}'",
                    name, dep
                )));
            }
            if dep == name.as_str() {
                return Err(DkError::Config(format!(
                    "task '{}' cannot refer to itself",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_log_level(cfg: &RawConfigFile) -> Result<()> {
    if let Some(level) = cfg.log.level.as_deref() {
        if crate::logging::parse_level_str(level).is_none() {
            return Err(DkError::Config(format!(
                "[log].level must be one of error, warn, info, debug, trace (got '{}')",
                level
            )));
        }
    }
    Ok(())
}

fn validate_acyclic(cfg: &RawConfigFile) -> Result<()> {
    // Edge task -> dep for every callback and sub-task step: running `task`
    // dispatches `dep`.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.referenced_tasks() {
            graph.add_edge(name.as_str(), dep, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(DkError::Cycle(format!(
                "cycle detected involving task '{}'",
                node
            )))
        }
    }
}
