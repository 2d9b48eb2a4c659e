// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DkError {
    #[error("no param named `{0}`")]
    NoParam(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cycle detected in task callbacks: {0}")]
    Cycle(String),

    #[error("no hosts to run cmd on ({0})")]
    NoHosts(String),

    #[error("error running `{cmd}` (called from {location})")]
    CmdRun { cmd: String, location: String },

    #[error("error running `{cmd}` over ssh (called from {location})")]
    SshRun { cmd: String, location: String },

    #[error("process for `{cmd}` failed: {reason}")]
    Process { cmd: String, reason: String },

    #[error("`{0}` is already running")]
    AlreadyRunning(String),

    #[error("cannot wait on `{0}` from inside an async runtime; drive tasks from sync code")]
    AsyncContext(String),

    #[error("task `{0}` does not implement `run`")]
    NotImplemented(String),

    #[error("invalid param value: {0}")]
    Params(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DkError>;
