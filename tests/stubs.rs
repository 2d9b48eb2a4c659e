// tests/stubs.rs

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::rc::Rc;

use dk::errors::DkError;
use dk::exec::{CmdOpts, Hosts, LocalCmd, RemoteCmd};
use dk::params::Params;
use dk::runner::{Run, Runner, RunnerOptions, SshConfig, StubKey};
use dk::task::{RunResult, Task, TaskContext, TaskDef, TaskRegistry};

type TestResult = Result<(), Box<dyn Error>>;

type Seen = Rc<RefCell<Vec<LocalCmd>>>;

/// Runs a fixed list of local commands and keeps every handle it got back.
#[derive(Clone)]
struct Caller {
    calls: Vec<(String, Option<String>, CmdOpts)>,
    seen: Seen,
}

impl Caller {
    fn def(name: &str, calls: &[(&str, Option<&str>, CmdOpts)], seen: &Seen) -> TaskDef {
        let caller = Caller {
            calls: calls
                .iter()
                .map(|(cmd, input, opts)| (cmd.to_string(), input.map(str::to_string), opts.clone()))
                .collect(),
            seen: Rc::clone(seen),
        };
        TaskDef::new(name, move || Box::new(caller.clone()))
    }
}

impl Task for Caller {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        for (cmd, input, opts) in &self.calls {
            let mut call = ctx.cmd(cmd.as_str()).opts(opts.clone());
            if let Some(input) = input {
                call = call.input(input.as_str());
            }
            let ran = call.run()?;
            self.seen.borrow_mut().push(ran);
        }
        Ok(())
    }
}

fn plain(cmd: &str) -> (&str, Option<&str>, CmdOpts) {
    (cmd, None, CmdOpts::default())
}

fn test_runner(defs: Vec<TaskDef>) -> Runner {
    let mut registry = TaskRegistry::new();
    for def in defs {
        registry.register(def);
    }
    Runner::test(Rc::new(registry), RunnerOptions::default())
}

#[test]
fn stubbed_calls_share_one_spy() -> TestResult {
    let seen = Seen::default();
    let mut runner = test_runner(vec![Caller::def(
        "T",
        &[plain("git pull"), plain("git pull"), plain("ls")],
        &seen,
    )]);
    runner.stub_cmd("git pull", |cmd: &LocalCmd| cmd.set_stdout("Already up to date."));

    runner.run("T", Params::new())?;

    let seen = seen.borrow();
    assert!(seen[0].ptr_eq(&seen[1]));
    assert_eq!(seen[0].stdout(), "Already up to date.");
    assert_eq!(seen[0].run_calls().len(), 2);
    assert!(!seen[2].ptr_eq(&seen[0]));
    assert_eq!(seen[2].stdout(), "");
    assert!(seen[2].is_spy());
    Ok(())
}

#[test]
fn unstub_gives_a_fresh_spy() -> TestResult {
    let seen = Seen::default();
    let mut runner = test_runner(vec![Caller::def("T", &[plain("make")], &seen)]);
    runner.stub_cmd("make", |cmd: &LocalCmd| cmd.set_exit_status(2));
    assert_eq!(runner.cmd_stubs(), 1);

    runner.run("T", Params::new())?;
    runner.unstub_cmd("make");
    assert_eq!(runner.cmd_stubs(), 0);
    runner.run("T", Params::new())?;

    let seen = seen.borrow();
    assert!(!seen[0].success());
    assert!(seen[1].success());
    assert!(!seen[0].ptr_eq(&seen[1]));
    Ok(())
}

#[test]
fn restubbing_the_same_key_replaces_the_stub() -> TestResult {
    let seen = Seen::default();
    let mut runner = test_runner(vec![Caller::def("T", &[plain("id")], &seen)]);
    runner.stub_cmd("id", |cmd: &LocalCmd| cmd.set_stdout("first"));
    runner.stub_cmd("id", |cmd: &LocalCmd| cmd.set_stdout("second"));
    assert_eq!(runner.cmd_stubs(), 1);

    runner.run("T", Params::new())?;
    assert_eq!(seen.borrow()[0].stdout(), "second");
    Ok(())
}

#[test]
fn newest_matching_stub_wins() -> TestResult {
    let seen = Seen::default();
    let mut runner = test_runner(vec![Caller::def("T", &[plain("whoami")], &seen)]);
    runner.stub_cmd("whoami", |cmd: &LocalCmd| cmd.set_stdout("old"));
    runner.stub_cmd(
        StubKey::deferred(|_view| "whoami".to_string()),
        |cmd: &LocalCmd| cmd.set_stdout("new"),
    );
    assert_eq!(runner.cmd_stubs(), 2);

    runner.run("T", Params::new())?;
    assert_eq!(seen.borrow()[0].stdout(), "new");
    Ok(())
}

#[test]
fn deferred_keys_resolve_against_the_calling_task() -> TestResult {
    let seen = Seen::default();
    let mut registry = TaskRegistry::new();
    registry.register(Caller::def("deploy", &[plain("deploy web")], &seen));
    let mut runner = Runner::test(
        Rc::new(registry),
        RunnerOptions {
            params: Params::new().with("app", "web"),
            ..RunnerOptions::default()
        },
    );
    runner.stub_cmd(
        StubKey::deferred(|view| {
            format!("{} {}", view.name(), view.try_str("app").unwrap_or_default())
        }),
        |cmd: &LocalCmd| cmd.set_stdout("deployed"),
    );

    runner.run("deploy", Params::new())?;
    assert_eq!(seen.borrow()[0].stdout(), "deployed");
    Ok(())
}

#[test]
fn stub_keys_match_on_input_and_opts() -> TestResult {
    let seen = Seen::default();
    let env = CmdOpts::new().env("STAGE", "prod");
    let mut runner = test_runner(vec![Caller::def(
        "T",
        &[
            ("psql", Some("select 1"), CmdOpts::default()),
            ("psql", Some("select 2"), CmdOpts::default()),
            ("migrate", None, env.clone()),
            ("migrate", None, CmdOpts::default()),
        ],
        &seen,
    )]);
    runner.stub_cmd(StubKey::new("psql").input("select 1"), |cmd: &LocalCmd| {
        cmd.set_stdout("1")
    });
    runner.stub_cmd(StubKey::new("migrate").opts(env), |cmd: &LocalCmd| {
        cmd.set_stdout("migrated")
    });

    runner.run("T", Params::new())?;

    let stdouts: Vec<String> = seen.borrow().iter().map(LocalCmd::stdout).collect();
    assert_eq!(stdouts, vec!["1", "", "migrated", ""]);
    assert_eq!(seen.borrow()[0].run_input().as_deref(), Some("select 1"));
    Ok(())
}

#[test]
fn stubs_win_over_dry_tree_run() -> TestResult {
    let seen = Seen::default();
    let forced = CmdOpts::new().dry_tree_run(true);
    let mut registry = TaskRegistry::new();
    registry.register(Caller::def(
        "T",
        &[
            ("echo stubbed", None, forced.clone()),
            ("echo real", None, forced.clone()),
            plain("echo skipped"),
        ],
        &seen,
    ));
    let mut runner = Runner::dry(Rc::new(registry), RunnerOptions::default());
    runner.stub_cmd(StubKey::new("echo stubbed").opts(forced), |cmd: &LocalCmd| {
        cmd.set_stdout("canned")
    });

    runner.run("T", Params::new())?;

    let seen = seen.borrow();
    assert!(seen[0].is_spy());
    assert_eq!(seen[0].stdout(), "canned");
    assert!(!seen[1].is_spy());
    assert_eq!(seen[1].stdout(), "real\n");
    assert!(seen[2].is_spy());
    assert!(seen[2].run_called());
    Ok(())
}

#[test]
fn live_runner_ignores_stubs() -> TestResult {
    let seen = Seen::default();
    let mut registry = TaskRegistry::new();
    registry.register(Caller::def("T", &[plain("echo live")], &seen));
    let mut runner = Runner::new(Rc::new(registry), RunnerOptions::default());
    runner.stub_cmd("echo live", |cmd: &LocalCmd| cmd.set_stdout("stubbed"));

    runner.run("T", Params::new())?;

    assert!(!seen.borrow()[0].is_spy());
    assert_eq!(seen.borrow()[0].stdout(), "live\n");
    Ok(())
}

/// Runs one ssh command against the task's default hosts.
struct Uptime {
    seen: Rc<RefCell<Vec<RemoteCmd>>>,
}

impl Task for Uptime {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        let cmd = ctx.ssh("uptime").run()?;
        self.seen.borrow_mut().push(cmd);
        Ok(())
    }
}

#[test]
fn ssh_stubs_program_every_dispatch() -> TestResult {
    let seen: Rc<RefCell<Vec<RemoteCmd>>> = Rc::default();
    let task_seen = Rc::clone(&seen);
    let mut registry = TaskRegistry::new();
    registry.register(
        TaskDef::new("check", move || {
            Box::new(Uptime {
                seen: Rc::clone(&task_seen),
            })
        })
        .ssh_hosts("web"),
    );
    let ssh = SshConfig {
        hosts: BTreeMap::from([("web".to_string(), vec!["w2".to_string(), "w1".to_string()])]),
        args: "-q".to_string(),
        host_args: BTreeMap::new(),
    };
    let mut runner = Runner::test(
        Rc::new(registry),
        RunnerOptions {
            ssh,
            ..RunnerOptions::default()
        },
    );
    runner.stub_ssh("uptime", |cmd: &RemoteCmd| cmd.set_stdout("up 3 days"));
    assert_eq!(runner.ssh_stubs(), 1);

    runner.run("check", Params::new())?;
    runner.run("check", Params::new())?;

    let seen = seen.borrow();
    assert!(seen[0].ptr_eq(&seen[1]));
    assert_eq!(seen[0].hosts(), vec!["w1", "w2"]);
    assert_eq!(seen[0].ssh_args(), "-q");
    assert_eq!(seen[0].local_cmds()["w1"].stdout(), "up 3 days");
    assert!(seen[0].run_called());

    let recorded = runner.runs().iter().filter_map(Run::as_ssh).count();
    assert_eq!(recorded, 2);

    runner.unstub_all_ssh();
    assert_eq!(runner.ssh_stubs(), 0);
    Ok(())
}

/// Runs `hostname` over ssh, optionally with call-site hosts.
struct Hostname {
    hosts: Option<Hosts>,
    seen: Rc<RefCell<Vec<RemoteCmd>>>,
}

impl Task for Hostname {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        let mut call = ctx.ssh("hostname");
        if let Some(hosts) = &self.hosts {
            call = call.hosts(hosts.clone());
        }
        let cmd = call.run()?;
        self.seen.borrow_mut().push(cmd);
        Ok(())
    }
}

fn hostname_def(hosts: Option<Hosts>, seen: &Rc<RefCell<Vec<RemoteCmd>>>) -> TaskDef {
    let seen = Rc::clone(seen);
    TaskDef::new("hostname", move || {
        Box::new(Hostname {
            hosts: hosts.clone(),
            seen: Rc::clone(&seen),
        })
    })
}

fn grouped_runner(def: TaskDef) -> Runner {
    let mut registry = TaskRegistry::new();
    registry.register(def);
    let ssh = SshConfig {
        hosts: BTreeMap::from([
            ("web".to_string(), vec!["w2".to_string(), "w1".to_string()]),
            ("db".to_string(), vec!["db9".to_string()]),
        ]),
        ..SshConfig::default()
    };
    Runner::test(
        Rc::new(registry),
        RunnerOptions {
            ssh,
            ..RunnerOptions::default()
        },
    )
}

#[test]
fn call_site_hosts_override_the_task_default() -> TestResult {
    let seen: Rc<RefCell<Vec<RemoteCmd>>> = Rc::default();
    let def = hostname_def(Some(Hosts::from("web")), &seen).ssh_hosts("db");
    let mut runner = grouped_runner(def);

    runner.run("hostname", Params::new())?;

    assert_eq!(seen.borrow()[0].hosts(), vec!["w1", "w2"]);
    Ok(())
}

#[test]
fn deferred_default_hosts_read_task_params() -> TestResult {
    let seen: Rc<RefCell<Vec<RemoteCmd>>> = Rc::default();
    let def = hostname_def(None, &seen)
        .ssh_hosts_with(|view| Hosts::Named(view.try_str("group").unwrap_or_default()));
    let mut runner = grouped_runner(def);

    runner.run("hostname", Params::new().with("group", "web"))?;
    runner.run("hostname", Params::new().with("group", "db"))?;

    let seen = seen.borrow();
    assert_eq!(seen[0].hosts(), vec!["w1", "w2"]);
    assert_eq!(seen[1].hosts(), vec!["db9"]);
    Ok(())
}

#[test]
fn ssh_without_any_hosts_fails() {
    let seen: Rc<RefCell<Vec<RemoteCmd>>> = Rc::default();
    let mut runner = grouped_runner(hostname_def(None, &seen));

    let err = runner.run("hostname", Params::new()).unwrap_err();

    assert!(matches!(err, DkError::NoHosts(_)), "unexpected error: {err:?}");
    assert!(seen.borrow().is_empty());
}
