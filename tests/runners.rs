// tests/runners.rs

use std::error::Error;
use std::rc::Rc;
use std::time::Duration;

use dk::exec::{CmdOpts, RemoteCmd};
use dk::params::Params;
use dk::runner::log::pretty_run_time;
use dk::runner::{Run, Runner, RunnerKind, RunnerOptions, TaskRun};
use dk::task::{RunResult, Task, TaskContext, TaskDef, TaskRegistry};
use dk_test_utils::{CallLog, MemoryLogger, ProbeTask, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

fn deploy_registry(log: &CallLog) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register(ProbeTask::new("build", log).cmd("echo building").into_def("build"));
    registry.register(ProbeTask::new("restart", log).into_def("restart"));
    registry.register(ProbeTask::new("notify", log).into_def("notify"));
    registry.register(
        ProbeTask::new("deploy", log)
            .cmd("echo deploying")
            .sub_task("restart", Params::new())
            .into_def("deploy")
            .before("build")
            .after("notify"),
    );
    registry
}

#[test]
fn dry_runner_runs_every_task_with_spies() -> TestResult {
    init_tracing();
    let log = CallLog::new();
    let mut runner = Runner::dry(Rc::new(deploy_registry(&log)), RunnerOptions::default());
    assert!(matches!(runner.kind(), RunnerKind::Dry));

    let handle = runner.run("deploy", Params::new())?;

    assert_eq!(
        log.entries(),
        vec![
            "build",
            "build.end",
            "deploy",
            "restart",
            "restart.end",
            "deploy.end",
            "notify",
            "notify.end"
        ]
    );
    let probe = handle.downcast_ref::<ProbeTask>().expect("probe body");
    assert!(probe.ran[0].is_spy());
    assert!(probe.ran[0].run_called());
    assert!(runner.runs().is_empty());
    assert!(runner.render_tree().is_none());
    Ok(())
}

#[test]
fn tree_runner_renders_each_top_level_run() -> TestResult {
    let log = CallLog::new();
    let logger = MemoryLogger::new();
    let mut runner = Runner::tree(
        Rc::new(deploy_registry(&log)),
        RunnerOptions {
            logger: logger.boxed(),
            ..RunnerOptions::default()
        },
    );

    runner.run("deploy", Params::new())?;
    assert_eq!(
        runner.render_tree().as_deref(),
        Some(" 1) deploy\n    |-- build\n    |-- restart\n    |-- notify\n")
    );

    runner.run("restart", Params::new())?;
    assert_eq!(runner.render_tree().as_deref(), Some(" 2) restart\n"));

    let roots: Vec<&TaskRun> = runner.task_runs();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].task, "restart");

    // Tree runs never log.
    assert!(logger.lines().is_empty());
    Ok(())
}

#[test]
fn tree_renders_nested_levels() -> TestResult {
    let log = CallLog::new();
    let mut registry = TaskRegistry::new();
    registry.register(ProbeTask::new("c", &log).into_def("c"));
    registry.register(ProbeTask::new("b", &log).sub_task("c", Params::new()).into_def("b"));
    registry.register(ProbeTask::new("a", &log).sub_task("b", Params::new()).into_def("a"));

    let mut runner = Runner::tree(Rc::new(registry), RunnerOptions::default());
    runner.run("a", Params::new())?;

    assert_eq!(
        runner.render_tree().as_deref(),
        Some(" 1) a\n    |-- b\n        |-- c\n")
    );
    Ok(())
}

#[test]
fn test_runner_runs_only_the_top_level_body() -> TestResult {
    let log = CallLog::new();
    let mut runner = Runner::test(Rc::new(deploy_registry(&log)), RunnerOptions::default());

    runner.run("deploy", Params::new())?;

    assert_eq!(log.entries(), vec!["deploy", "deploy.end"]);

    let names: Vec<&str> = runner
        .task_runs()
        .iter()
        .map(|run| run.task.as_str())
        .collect();
    assert_eq!(names, vec!["build", "restart", "notify"]);

    let kinds: Vec<&str> = runner
        .runs()
        .iter()
        .map(|run| match run {
            Run::Task(_) => "task",
            Run::Cmd(_) => "cmd",
            Run::Ssh(_) => "ssh",
        })
        .collect();
    assert_eq!(kinds, vec!["task", "cmd", "task", "task"]);

    let cmd = runner.runs()[1].as_cmd().expect("recorded cmd");
    assert_eq!(cmd.cmd_str(), "echo deploying");
    assert!(cmd.is_spy());
    Ok(())
}

#[test]
fn test_runner_records_sub_task_params() -> TestResult {
    let log = CallLog::new();
    let mut registry = TaskRegistry::new();
    registry.register(ProbeTask::new("child", &log).into_def("child"));
    registry.register(
        ProbeTask::new("parent", &log)
            .sub_task("child", Params::new().with("n", 1))
            .into_def("parent"),
    );

    let mut runner = Runner::test(Rc::new(registry), RunnerOptions::default());
    runner.run("parent", Params::new())?;

    assert_eq!(
        runner.task_runs(),
        vec![&TaskRun::new("child", Params::new().with("n", 1))]
    );
    Ok(())
}

#[test]
fn live_runner_logs_tasks_and_cmds() -> TestResult {
    let log = CallLog::new();
    let logger = MemoryLogger::new();
    let mut registry = TaskRegistry::new();
    registry.register(ProbeTask::new("T", &log).cmd("echo hi").into_def("T"));
    let mut runner = Runner::new(
        Rc::new(registry),
        RunnerOptions {
            logger: logger.boxed(),
            ..RunnerOptions::default()
        },
    );

    runner.run("T", Params::new())?;

    let infos = logger.infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0], "[CMD] echo hi");
    assert!(infos[1].starts_with("      (") && infos[1].ends_with("ms)"));

    let debugs = logger.debugs();
    assert_eq!(debugs.first().map(String::as_str), Some(" >>>  T"));
    assert!(debugs.contains(&"      > hi".to_string()));
    assert!(debugs.last().is_some_and(|line| line.starts_with(" <<<  T (")));
    assert!(logger.errors().is_empty());
    Ok(())
}

#[test]
fn task_log_helpers_indent_messages() -> TestResult {
    struct Chatty;
    impl Task for Chatty {
        fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
            ctx.log_info("hello");
            ctx.log_debug("details");
            ctx.log_error("uh oh");
            Ok(())
        }
    }

    let logger = MemoryLogger::new();
    let mut registry = TaskRegistry::new();
    registry.register(TaskDef::new("chatty", || Box::new(Chatty)));
    let mut runner = Runner::dry(
        Rc::new(registry),
        RunnerOptions {
            logger: logger.boxed(),
            ..RunnerOptions::default()
        },
    );

    runner.run("chatty", Params::new())?;

    assert_eq!(logger.infos(), vec!["      hello"]);
    assert!(logger.debugs().contains(&"      details".to_string()));
    assert_eq!(logger.errors(), vec!["      uh oh"]);
    Ok(())
}

/// Runs `uptime` on an explicit host list.
struct Uptime;

impl Task for Uptime {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        let cmd = ctx.ssh("uptime").hosts(vec!["b".to_string(), "a".to_string()]).run()?;
        if !cmd.success() {
            return ctx.halt();
        }
        Ok(())
    }
}

#[test]
fn ssh_dispatch_logs_every_host() -> TestResult {
    let logger = MemoryLogger::new();
    let mut registry = TaskRegistry::new();
    registry.register(TaskDef::new("uptime", || Box::new(Uptime)));
    let mut runner = Runner::dry(
        Rc::new(registry),
        RunnerOptions {
            logger: logger.boxed(),
            ..RunnerOptions::default()
        },
    );
    runner.stub_ssh(
        dk::runner::StubKey::new("uptime")
            .opts(CmdOpts::new().hosts(vec!["b".to_string(), "a".to_string()])),
        |cmd: &RemoteCmd| {
            for local in cmd.local_cmds().values() {
                local.set_stdout("up");
            }
        },
    );

    runner.run("uptime", Params::new())?;

    let infos = logger.infos();
    assert_eq!(&infos[..3], ["[SSH] uptime", "      [a]", "      [b]"]);
    assert!(infos[3].starts_with("      ("));

    let debugs = logger.debugs();
    assert!(debugs.iter().any(|l| l.starts_with("      ssh  ") && l.contains(" a -- ")));
    assert!(debugs.contains(&"      [a] > up".to_string()));
    assert!(debugs.contains(&"      [b] > up".to_string()));
    Ok(())
}

#[test]
fn cli_banners_wrap_a_run() -> TestResult {
    let log = CallLog::new();
    let logger = MemoryLogger::new();
    let mut registry = TaskRegistry::new();
    registry.register(ProbeTask::new("T", &log).into_def("T"));
    let mut runner = Runner::new(
        Rc::new(registry),
        RunnerOptions {
            logger: logger.boxed(),
            ..RunnerOptions::default()
        },
    );

    runner.log_cli_run("T", |runner| {
        runner.log_cli_task_run("T", |runner| runner.run("T", Params::new()).map(|_| ()))
    })?;

    let debugs = logger.debugs();
    assert!(debugs[..15].iter().all(String::is_empty));
    assert_eq!(debugs[15], "=".repeat(36));
    assert_eq!(debugs[16], format!("{} `T`", ">".repeat(36)));
    assert_eq!(debugs[debugs.len() - 2], format!("{} `T`", "<".repeat(36)));

    let infos = logger.infos();
    assert_eq!(infos[0], "Starting `T`.");
    assert!(infos[1].starts_with("`T` finished in "));
    assert_eq!(&infos[2..4], ["", ""]);
    assert!(infos[4].starts_with('(') && infos[4].ends_with(')'));
    Ok(())
}

#[test]
fn pretty_run_time_switches_to_minutes() {
    assert_eq!(pretty_run_time(Duration::from_millis(12)), "12.0ms");
    assert_eq!(pretty_run_time(Duration::from_micros(1234)), "1.2ms");
    assert_eq!(pretty_run_time(Duration::from_millis(1499)), "1499.0ms");
    assert_eq!(pretty_run_time(Duration::from_millis(1500)), "0:02s");
    assert_eq!(pretty_run_time(Duration::from_secs(125)), "2:05s");
}

/// Starts a command, does other work, then waits on it.
struct Background {
    log: CallLog,
}

impl Task for Background {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        let server = ctx.cmd("echo started").start()?;
        self.log.push("between");
        server.wait()?;
        self.log.push(format!("spy={} out={}", server.is_spy(), server.stdout().trim()));
        Ok(())
    }
}

fn background_registry(log: &CallLog) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    let task_log = log.clone();
    registry.register(TaskDef::new("bg", move || {
        Box::new(Background {
            log: task_log.clone(),
        })
    }));
    registry
}

#[test]
fn started_cmds_are_waited_on_later() -> TestResult {
    let log = CallLog::new();
    let mut runner = Runner::new(Rc::new(background_registry(&log)), RunnerOptions::default());
    runner.run("bg", Params::new())?;
    assert_eq!(log.entries(), vec!["between", "spy=false out=started"]);

    let log = CallLog::new();
    let mut runner = Runner::test(Rc::new(background_registry(&log)), RunnerOptions::default());
    runner.run("bg", Params::new())?;
    assert_eq!(log.entries(), vec!["between", "spy=true out="]);

    let cmd = runner.runs()[0].as_cmd().expect("recorded start");
    assert!(cmd.start_called());
    assert!(cmd.wait_called());
    assert!(!cmd.run_called());
    Ok(())
}

/// Fails unless every host succeeds.
struct StrictSsh;

impl Task for StrictSsh {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> RunResult {
        ctx.ssh("systemctl is-active app").hosts("db1").run_checked()?;
        Ok(())
    }
}

#[test]
fn checked_ssh_reports_the_call_site() {
    let mut registry = TaskRegistry::new();
    registry.register(TaskDef::new("strict", || Box::new(StrictSsh)));
    let mut runner = Runner::test(Rc::new(registry), RunnerOptions::default());
    runner.stub_ssh(
        dk::runner::StubKey::new("systemctl is-active app").opts(CmdOpts::new().hosts("db1")),
        |cmd: &RemoteCmd| cmd.set_exit_status(3),
    );

    let err = runner.run("strict", Params::new()).unwrap_err();

    match err {
        dk::errors::DkError::SshRun { cmd, location } => {
            assert_eq!(cmd, "systemctl is-active app");
            assert!(location.contains("runners.rs"), "location was {location}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
