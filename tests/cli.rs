// tests/cli.rs

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use dk::cli::{CliArgs, LogLevel};
use dk::errors::DkError;
use dk::{run, task_list};
use dk_test_utils::{ConfigFileBuilder, TaskConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn sample_config() -> dk::config::ConfigFile {
    ConfigFileBuilder::new()
        .with_task("build", TaskConfigBuilder::new().desc("Build it").cmd("make").build())
        .with_task(
            "deploy",
            TaskConfigBuilder::new()
                .desc("Ship it")
                .before("build")
                .ssh("restart", None)
                .ssh_hosts("web")
                .build(),
        )
        .with_task("lint", TaskConfigBuilder::new().build())
        .with_host_group("web", &["web1", "web2"])
        .build()
}

#[test]
fn parses_flags_and_task_names() -> TestResult {
    let args = CliArgs::try_parse_from([
        "dk",
        "--dry-run",
        "-v",
        "--config",
        "ops/dk.toml",
        "--log-level",
        "trace",
        "build",
        "deploy",
    ])?;

    assert_eq!(args.tasks, vec!["build", "deploy"]);
    assert!(args.dry_run);
    assert!(!args.tree);
    assert!(args.verbose);
    assert!(matches!(args.log_level, Some(LogLevel::Trace)));
    assert_eq!(args.config_path(), PathBuf::from("ops/dk.toml"));
    Ok(())
}

#[test]
fn tree_conflicts_with_dry_run() {
    assert!(CliArgs::try_parse_from(["dk", "--tree", "--dry-run", "x"]).is_err());
}

#[test]
fn lists_tasks_when_none_are_given() -> TestResult {
    let cfg = sample_config();
    let args = CliArgs::try_parse_from(["dk"])?;
    let mut out = Vec::new();

    run(&args, &cfg, &mut out)?;

    let text = String::from_utf8(out)?;
    assert_eq!(
        text,
        "build  # Build it\ndeploy # Ship it\nlint   # \n"
    );
    Ok(())
}

#[test]
fn list_flag_wins_over_task_names() -> TestResult {
    let cfg = sample_config();
    let args = CliArgs::try_parse_from(["dk", "-T", "deploy"])?;
    let mut out = Vec::new();

    run(&args, &cfg, &mut out)?;

    assert_eq!(String::from_utf8(out)?, format!("{}\n", task_list(&cfg.registry())));
    Ok(())
}

#[test]
fn unknown_tasks_are_reported_together() -> TestResult {
    let cfg = sample_config();
    let args = CliArgs::try_parse_from(["dk", "nope", "build", "missing"])?;
    let mut out = Vec::new();

    let err = run(&args, &cfg, &mut out).unwrap_err();

    match err.downcast_ref::<DkError>() {
        Some(DkError::UnknownTask(names)) => assert_eq!(names, "`nope`, `missing`"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn tree_mode_prints_one_tree_per_task() -> TestResult {
    let cfg = sample_config();
    let args = CliArgs::try_parse_from(["dk", "--tree", "deploy", "lint"])?;
    let mut out = Vec::new();

    run(&args, &cfg, &mut out)?;

    assert_eq!(
        String::from_utf8(out)?,
        "building task trees...\n 1) deploy\n    |-- build\n 2) lint\n"
    );
    Ok(())
}

#[test]
fn dry_run_executes_nothing_and_prints_nothing() -> TestResult {
    let cfg = sample_config();
    let args = CliArgs::try_parse_from(["dk", "--dry-run", "deploy"])?;
    let mut out = Vec::new();

    run(&args, &cfg, &mut out)?;

    assert!(out.is_empty());
    Ok(())
}
