// src/config/mod.rs

//! Configuration loading and validation for dk.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate task references and cycles (`validate.rs`).
//! - Turn a validated config into a [`TaskRegistry`] of shell tasks and the
//!   options runners are built from.

pub mod loader;
pub mod model;
pub mod validate;

use crate::runner::{CannedOutput, DryTreeStub, RunnerOptions, SshConfig};
use crate::task::shell::StepOpts;
use crate::task::{ShellTask, Step, TaskDef, TaskRegistry};
use crate::types::Phase;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CallbackConfig, ConfigFile, DryTreeSection, LogSection, RawConfigFile, SshSection,
    StepConfig, StubConfig, TaskConfig,
};
pub use validate::validate_config;

impl ConfigFile {
    /// A registry with one [`ShellTask`] per `[task.<name>]`.
    pub fn registry(&self) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for (name, task) in &self.task {
            registry.register(task_def(name, task));
        }
        registry
    }

    /// Params, ssh defaults and dry/tree stubs for a runner.
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            params: self.params.clone(),
            ssh: SshConfig {
                hosts: self.ssh.hosts.clone(),
                args: self.ssh.args.clone(),
                host_args: self.ssh.host_args.clone(),
            },
            logger: None,
            dry_tree_cmd_stubs: self.dry_tree.cmd.iter().map(dry_tree_stub).collect(),
            dry_tree_ssh_stubs: self.dry_tree.ssh.iter().map(dry_tree_stub).collect(),
        }
    }
}

fn task_def(name: &str, task: &TaskConfig) -> TaskDef {
    let steps: Vec<Step> = task.run.iter().map(step).collect();
    let mut def = TaskDef::new(name, move || Box::new(ShellTask::new(steps.clone())))
        .run_only_once(task.run_only_once);

    if let Some(desc) = &task.description {
        def = def.description(desc.clone());
    }
    if let Some(hosts) = &task.ssh_hosts {
        def = def.ssh_hosts(hosts.clone());
    }

    for (phase, callbacks) in [
        (Phase::PrependBefore, &task.prepend_before),
        (Phase::Before, &task.before),
        (Phase::PrependAfter, &task.prepend_after),
        (Phase::After, &task.after),
    ] {
        for callback in callbacks {
            def = def.callback(phase, callback.task(), callback.params());
        }
    }
    def
}

fn step(config: &StepConfig) -> Step {
    match config {
        StepConfig::Cmd {
            cmd,
            input,
            env,
            dry_tree_run,
            check,
        } => Step::Cmd {
            cmd: cmd.clone(),
            opts: StepOpts {
                input: input.clone(),
                env: env.clone(),
                dry_tree_run: *dry_tree_run,
                check: *check,
            },
        },
        StepConfig::Ssh {
            ssh,
            hosts,
            input,
            env,
            dry_tree_run,
            check,
        } => Step::Ssh {
            cmd: ssh.clone(),
            hosts: hosts.clone(),
            opts: StepOpts {
                input: input.clone(),
                env: env.clone(),
                dry_tree_run: *dry_tree_run,
                check: *check,
            },
        },
        StepConfig::Task { task, params } => Step::Task {
            task: task.clone(),
            params: params.clone(),
        },
    }
}

fn dry_tree_stub(config: &StubConfig) -> DryTreeStub {
    DryTreeStub {
        cmd_str: config.cmd.clone(),
        input: config.input.clone(),
        opts: config.opts(),
        output: CannedOutput {
            stdout: config.stdout.clone(),
            stderr: config.stderr.clone(),
            exit_status: config.exit_status,
        },
    }
}
