// src/exec/mod.rs

//! Command execution layer.
//!
//! - [`process`] owns the raw process primitive: a live `sh -c` child on a
//!   shared tokio runtime, or a spy that only records calls.
//! - [`local`] wraps one process as a [`LocalCmd`].
//! - [`remote`] fans a command out over ssh as a [`RemoteCmd`].
//! - [`opts`] holds the call-site options both are built from.
//!
//! Runners only ever deal in [`Command`]s; whether a given command is live
//! or a spy is decided once, when the runner builds it.

pub mod local;
pub mod opts;
pub mod process;
pub mod remote;

pub use local::{LocalCmd, OutputLine, Stream};
pub use opts::{CmdOpts, Hosts, SshOpts};
pub use remote::{RemoteCmd, ssh_cmd_str};

use crate::errors::Result;

/// What the engine needs from a command, live or spy.
pub trait Command {
    fn cmd_str(&self) -> String;
    fn run(&self, input: Option<&str>) -> Result<()>;
    fn success(&self) -> bool;
    fn output_lines(&self) -> Vec<OutputLine>;
    fn is_spy(&self) -> bool;
}

impl Command for LocalCmd {
    fn cmd_str(&self) -> String {
        LocalCmd::cmd_str(self)
    }

    fn run(&self, input: Option<&str>) -> Result<()> {
        LocalCmd::run(self, input)
    }

    fn success(&self) -> bool {
        LocalCmd::success(self)
    }

    fn output_lines(&self) -> Vec<OutputLine> {
        LocalCmd::output_lines(self)
    }

    fn is_spy(&self) -> bool {
        LocalCmd::is_spy(self)
    }
}

impl Command for RemoteCmd {
    fn cmd_str(&self) -> String {
        RemoteCmd::cmd_str(self)
    }

    fn run(&self, input: Option<&str>) -> Result<()> {
        RemoteCmd::run(self, input)
    }

    fn success(&self) -> bool {
        RemoteCmd::success(self)
    }

    fn output_lines(&self) -> Vec<OutputLine> {
        RemoteCmd::output_lines(self)
    }

    fn is_spy(&self) -> bool {
        RemoteCmd::is_spy(self)
    }
}
